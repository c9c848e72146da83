//! Per-axis index keys and extraction results.

use std::ops::Range;

use crate::error::{KernelError, Result};
use crate::matrix::SparseMatrix;
use crate::scalar::SparseScalar;
use crate::vector::SparseVector;

/// Selection along one axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Index {
    /// The full axis.
    All,
    /// A single position; the axis is dropped from the result.
    At(usize),
    /// A contiguous half-open range.
    Range(Range<usize>),
    /// Explicit positions, in output order.
    List(Vec<usize>),
}

impl Index {
    /// Whether this selection drops its axis.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Index::At(_))
    }

    /// Whether this selection keeps the whole axis unchanged.
    pub fn is_full(&self, size: usize) -> bool {
        match self {
            Index::All => true,
            Index::Range(r) => r.start == 0 && r.end == size,
            _ => false,
        }
    }

    /// Number of selected positions.
    pub fn len(&self, size: usize) -> Result<usize> {
        Ok(self.resolve(size)?.len())
    }

    /// Selected positions along an axis of length `size`, bounds checked.
    pub fn resolve(&self, size: usize) -> Result<Vec<usize>> {
        let check = |index: usize| {
            if index < size {
                Ok(index)
            } else {
                Err(KernelError::IndexOutOfBounds { index, size })
            }
        };
        match self {
            Index::All => Ok((0..size).collect()),
            Index::At(i) => Ok(vec![check(*i)?]),
            Index::Range(r) => {
                if r.end > size {
                    return Err(KernelError::IndexOutOfBounds {
                        index: r.end,
                        size,
                    });
                }
                Ok(r.clone().collect())
            }
            Index::List(list) => list.iter().map(|&i| check(i)).collect(),
        }
    }
}

impl From<usize> for Index {
    fn from(i: usize) -> Self {
        Index::At(i)
    }
}

impl From<Range<usize>> for Index {
    fn from(r: Range<usize>) -> Self {
        Index::Range(r)
    }
}

impl From<Vec<usize>> for Index {
    fn from(list: Vec<usize>) -> Self {
        Index::List(list)
    }
}

/// Result of an indexed extraction; its rank depends on the keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Scalar(SparseScalar),
    Vector(SparseVector),
    Matrix(SparseMatrix),
}
