//! Process-wide defaults with atomic access.

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Error for invalid combine-tree fan-in values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Invalid split_every value: {0}. split_every must be at least 2.")]
pub struct InvalidSplitEveryError(pub usize);

/// A global default fan-in for reduction combine trees.
///
/// # Example
///
/// ```
/// use block_expr::GlobalSplitEvery;
///
/// static MY_DEFAULT: GlobalSplitEvery = GlobalSplitEvery::new(4);
///
/// assert_eq!(MY_DEFAULT.get(), 4);
/// MY_DEFAULT.set(8).unwrap();
/// assert!(MY_DEFAULT.set(1).is_err());
/// ```
pub struct GlobalSplitEvery {
    value: AtomicUsize,
}

impl GlobalSplitEvery {
    /// This is a const fn, so it can be used in static declarations.
    #[must_use]
    pub const fn new(initial: usize) -> Self {
        Self {
            value: AtomicUsize::new(initial),
        }
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }

    /// Set a new default value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSplitEveryError` if the value is below 2.
    pub fn set(&self, value: usize) -> Result<(), InvalidSplitEveryError> {
        if value < 2 {
            return Err(InvalidSplitEveryError(value));
        }
        self.value.store(value, Ordering::Relaxed);
        Ok(())
    }
}

/// Fan-in used when a reduction does not specify one.
pub static DEFAULT_SPLIT_EVERY: GlobalSplitEvery = GlobalSplitEvery::new(4);
