//! Block payloads: one backend value of rank 0, 1 or 2.

use sparse_kernels::{
    ApplyOp, BinaryOp, DType, Extracted, Index, MaskKind, MatrixMask, SparseMatrix, SparseScalar,
    SparseVector, VectorMask,
};

use crate::error::{BlockExprError, Result};

/// A block of a partitioned object, or a whole object once gathered.
#[derive(Debug, Clone, PartialEq)]
pub enum Inner {
    Scalar(SparseScalar),
    Vector(SparseVector),
    Matrix(SparseMatrix),
}

fn kind_mismatch(expected: &str, found: &Inner) -> BlockExprError {
    BlockExprError::Unsupported(format!("expected a {expected}, found a {}", found.kind()))
}

impl Inner {
    /// Empty value of the given shape.
    pub fn empty(dtype: DType, shape: &[usize]) -> Result<Inner> {
        match *shape {
            [] => Ok(Inner::Scalar(SparseScalar::new(dtype))),
            [size] => Ok(Inner::Vector(SparseVector::new(dtype, size))),
            [nrows, ncols] => Ok(Inner::Matrix(SparseMatrix::new(dtype, nrows, ncols))),
            _ => Err(BlockExprError::Unsupported(format!(
                "rank {} objects",
                shape.len()
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Inner::Scalar(_) => "scalar",
            Inner::Vector(_) => "vector",
            Inner::Matrix(_) => "matrix",
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Inner::Scalar(s) => s.dtype(),
            Inner::Vector(v) => v.dtype(),
            Inner::Matrix(m) => m.dtype(),
        }
    }

    pub fn nvals(&self) -> usize {
        match self {
            Inner::Scalar(s) => s.nvals(),
            Inner::Vector(v) => v.nvals(),
            Inner::Matrix(m) => m.nvals(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Inner::Scalar(_) => Vec::new(),
            Inner::Vector(v) => vec![v.size()],
            Inner::Matrix(m) => m.shape().to_vec(),
        }
    }

    pub fn as_scalar(&self) -> Result<&SparseScalar> {
        match self {
            Inner::Scalar(s) => Ok(s),
            other => Err(kind_mismatch("scalar", other)),
        }
    }

    pub fn as_vector(&self) -> Result<&SparseVector> {
        match self {
            Inner::Vector(v) => Ok(v),
            other => Err(kind_mismatch("vector", other)),
        }
    }

    pub fn as_matrix(&self) -> Result<&SparseMatrix> {
        match self {
            Inner::Matrix(m) => Ok(m),
            other => Err(kind_mismatch("matrix", other)),
        }
    }

    pub fn dup(&self, dtype: Option<DType>) -> Inner {
        match self {
            Inner::Scalar(s) => Inner::Scalar(s.dup(dtype)),
            Inner::Vector(v) => Inner::Vector(v.dup(dtype)),
            Inner::Matrix(m) => Inner::Matrix(m.dup(dtype)),
        }
    }

    pub(crate) fn apply(&self, op: &ApplyOp) -> Result<Inner> {
        match self {
            Inner::Vector(v) => Ok(Inner::Vector(v.apply(op)?)),
            Inner::Matrix(m) => Ok(Inner::Matrix(m.apply(op)?)),
            other => Err(kind_mismatch("vector or matrix", other)),
        }
    }

    pub(crate) fn ewise_add(&self, other: &Inner, op: BinaryOp) -> Result<Inner> {
        match (self, other) {
            (Inner::Vector(a), Inner::Vector(b)) => Ok(Inner::Vector(a.ewise_add(b, op)?)),
            (Inner::Matrix(a), Inner::Matrix(b)) => Ok(Inner::Matrix(a.ewise_add(b, op)?)),
            (a, b) => Err(kind_mismatch(a.kind(), b)),
        }
    }

    pub(crate) fn ewise_mult(&self, other: &Inner, op: BinaryOp) -> Result<Inner> {
        match (self, other) {
            (Inner::Vector(a), Inner::Vector(b)) => Ok(Inner::Vector(a.ewise_mult(b, op)?)),
            (Inner::Matrix(a), Inner::Matrix(b)) => Ok(Inner::Matrix(a.ewise_mult(b, op)?)),
            (a, b) => Err(kind_mismatch(a.kind(), b)),
        }
    }

    /// Extraction with one key per axis.
    pub(crate) fn extract(&self, keys: &[Index]) -> Result<Inner> {
        let extracted = match (self, keys) {
            (Inner::Vector(v), [key]) => v.extract(key)?,
            (Inner::Matrix(m), [rows, cols]) => m.extract(rows, cols)?,
            (block, _) => {
                return Err(BlockExprError::RankMismatch {
                    expected: block.shape().len(),
                    actual: keys.len(),
                })
            }
        };
        Ok(extracted.into())
    }

    /// Filter by a mask block; scalars are returned unchanged.
    pub(crate) fn masked(&self, mask: &Inner, kind: MaskKind) -> Result<Inner> {
        match (self, mask) {
            (Inner::Scalar(_), _) => Ok(self.clone()),
            (Inner::Vector(v), Inner::Vector(m)) => {
                Ok(Inner::Vector(v.masked(&VectorMask::new(m, kind))?))
            }
            (Inner::Matrix(a), Inner::Matrix(m)) => {
                Ok(Inner::Matrix(a.masked(&MatrixMask::new(m, kind))?))
            }
            (a, m) => Err(kind_mismatch(a.kind(), m)),
        }
    }

    /// Qualified write of `source` into this block; this block keeps its
    /// dtype. Scalars ignore the mask and the replace flag.
    pub(crate) fn assign_qualified(
        &mut self,
        source: &Inner,
        mask: Option<(&Inner, MaskKind)>,
        accum: Option<BinaryOp>,
        replace: bool,
    ) -> Result<()> {
        match (self, source) {
            (Inner::Scalar(t), Inner::Scalar(s)) => Ok(t.assign(s, accum)?),
            (Inner::Vector(t), Inner::Vector(s)) => {
                let mask = match mask {
                    Some((m, kind)) => Some(VectorMask::new(m.as_vector()?, kind)),
                    None => None,
                };
                Ok(t.assign_qualified(s, mask.as_ref(), accum, replace)?)
            }
            (Inner::Matrix(t), Inner::Matrix(s)) => {
                let mask = match mask {
                    Some((m, kind)) => Some(MatrixMask::new(m.as_matrix()?, kind)),
                    None => None,
                };
                Ok(t.assign_qualified(s, mask.as_ref(), accum, replace)?)
            }
            (t, s) => Err(kind_mismatch(t.kind(), s)),
        }
    }
}

impl From<Extracted> for Inner {
    fn from(extracted: Extracted) -> Self {
        match extracted {
            Extracted::Scalar(s) => Inner::Scalar(s),
            Extracted::Vector(v) => Inner::Vector(v),
            Extracted::Matrix(m) => Inner::Matrix(m),
        }
    }
}
