//! Options for reductions and qualified writes.

use sparse_kernels::BinaryOp;

use crate::config::DEFAULT_SPLIT_EVERY;
use crate::error::{BlockExprError, Result};
use crate::mask::Mask;

/// Options for block reductions.
///
/// # Example
///
/// ```
/// use block_expr::ReduceOptions;
///
/// let opts = ReduceOptions::default().with_split_every(8);
/// assert_eq!(opts.split_every().unwrap(), 8);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Fan-in of the combine tree.
    ///
    /// If `None`, [`DEFAULT_SPLIT_EVERY`] is used.
    pub split_every: Option<usize>,
}

impl ReduceOptions {
    pub fn with_split_every(mut self, split_every: usize) -> Self {
        self.split_every = Some(split_every);
        self
    }

    /// Resolved fan-in.
    ///
    /// # Errors
    /// Returns [`BlockExprError::Usage`] for values below 2.
    pub fn split_every(&self) -> Result<usize> {
        match self.split_every {
            Some(n) if n < 2 => Err(BlockExprError::Usage(format!(
                "split_every must be at least 2, got {n}"
            ))),
            Some(n) => Ok(n),
            None => Ok(DEFAULT_SPLIT_EVERY.get()),
        }
    }
}

/// Write qualifiers for an [`Updater`](crate::Updater).
///
/// `replace` is only meaningful together with a mask; leaving it `None`
/// means "not given".
///
/// # Example
///
/// ```
/// use block_expr::{BlockPartition, PartitionedObject, WriteOptions};
/// use sparse_kernels::{BinaryOp, DType};
///
/// let m = PartitionedObject::new_vector(DType::Bool, BlockPartition::split(4, 2));
/// let opts = WriteOptions::default()
///     .with_mask(m.structure_mask())
///     .with_accum(BinaryOp::Plus)
///     .with_replace(true);
/// assert!(opts.mask.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub mask: Option<Mask>,
    pub accum: Option<BinaryOp>,
    pub replace: Option<bool>,
}

impl WriteOptions {
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_accum(mut self, accum: BinaryOp) -> Self {
        self.accum = Some(accum);
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = Some(replace);
        self
    }
}
