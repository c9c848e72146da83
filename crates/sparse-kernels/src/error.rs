//! Error types for block-local sparse kernels.

use thiserror::Error;

use crate::dtype::DType;
use crate::ops::BinaryOp;

/// Error type for sparse kernel operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// Operand shapes are incompatible for the operation.
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// An index lies outside the container.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    /// The same position was given twice during construction.
    #[error("Duplicate index {0:?}")]
    DuplicateIndex(Vec<usize>),

    /// Raw compressed arrays are inconsistent.
    #[error("Invalid compressed storage: {0}")]
    InvalidStorage(String),

    /// The operator cannot be used as a monoid.
    #[error("{0:?} is not a monoid (it must be associative and commutative with an identity)")]
    NotAMonoid(BinaryOp),

    /// Operation is undefined for the given operands.
    #[error("Domain error: {0}")]
    DomainError(String),

    /// An operand has an unexpected dtype.
    #[error("DType mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },
}

/// Result type for sparse kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
