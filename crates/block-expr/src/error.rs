//! Error types for deferred block expressions.

use sparse_kernels::KernelError;
use thiserror::Error;

/// Error type for partitioned objects and deferred expressions.
///
/// Errors are `Clone` so that a failed task can hand the same error to every
/// consumer of its memoised result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlockExprError {
    /// Invalid combination of arguments or write qualifiers.
    #[error("usage error: {0}")]
    Usage(String),

    /// The operation is not defined for these operands.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Failure reported by a block-local sparse kernel.
    #[error("backend error: {0}")]
    Backend(KernelError),

    /// Operands are blocked differently along an axis they share.
    #[error("incompatible partitions: {0}")]
    IncompatiblePartitions(String),

    /// Number of partitions, labels or keys does not match the rank.
    #[error("rank mismatch: expected {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },
}

impl From<KernelError> for BlockExprError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::NotAMonoid(_) => BlockExprError::Usage(err.to_string()),
            other => BlockExprError::Backend(other),
        }
    }
}

/// Result type for block expression operations.
pub type Result<T> = std::result::Result<T, BlockExprError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sparse_kernels::{BinaryOp, Monoid};

    #[test]
    fn test_not_a_monoid_is_usage_error() {
        let err: BlockExprError = Monoid::new(BinaryOp::Minus).unwrap_err().into();
        assert!(matches!(err, BlockExprError::Usage(_)));
    }

    #[test]
    fn test_kernel_errors_pass_through() {
        let err: BlockExprError = KernelError::IndexOutOfBounds { index: 3, size: 2 }.into();
        assert_eq!(
            err,
            BlockExprError::Backend(KernelError::IndexOutOfBounds { index: 3, size: 2 })
        );
    }
}
