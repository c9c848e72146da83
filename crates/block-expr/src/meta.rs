//! Shape and dtype of results that have not been computed.
//!
//! Every rule here is O(1) in the number of stored values: it inspects only
//! shapes, dtypes and operators, so invalid expressions fail while the graph
//! is being built.

use sparse_kernels::{ApplyOp, BinaryOp, DType, Index, KernelError, Monoid, Semiring};

use crate::error::{BlockExprError, Result};

/// Metadata placeholder for a partitioned object or expression result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    shape: Vec<usize>,
    dtype: DType,
    /// Number of stored values, when known without computing anything.
    nvals: Option<usize>,
}

fn shape_mismatch(expected: &[usize], actual: &[usize]) -> BlockExprError {
    BlockExprError::Backend(KernelError::DimensionMismatch {
        expected: expected.to_vec(),
        actual: actual.to_vec(),
    })
}

impl Meta {
    pub fn new(shape: Vec<usize>, dtype: DType, nvals: Option<usize>) -> Self {
        Self {
            shape,
            dtype,
            nvals,
        }
    }

    /// Placeholder for a computed result with an unknown number of values.
    fn result(shape: Vec<usize>, dtype: DType) -> Self {
        Self::new(shape, dtype, None)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn nvals(&self) -> Option<usize> {
        self.nvals
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    fn require_rank(&self, ndim: usize, op: &str) -> Result<()> {
        if self.ndim() != ndim {
            return Err(BlockExprError::Unsupported(format!(
                "{op} is not defined for rank {}",
                self.ndim()
            )));
        }
        Ok(())
    }

    fn reduced_dtype(&self, monoid: Monoid) -> DType {
        monoid.op().result_dtype(self.dtype, self.dtype)
    }

    /// Vector to scalar.
    pub fn reduce(&self, monoid: Monoid) -> Result<Meta> {
        self.require_rank(1, "reduce")?;
        Ok(Meta::result(Vec::new(), self.reduced_dtype(monoid)))
    }

    /// Matrix to scalar.
    pub fn reduce_scalar(&self, monoid: Monoid) -> Result<Meta> {
        self.require_rank(2, "reduce_scalar")?;
        Ok(Meta::result(Vec::new(), self.reduced_dtype(monoid)))
    }

    pub fn reduce_rowwise(&self, monoid: Monoid) -> Result<Meta> {
        self.require_rank(2, "reduce_rowwise")?;
        Ok(Meta::result(vec![self.shape[0]], self.reduced_dtype(monoid)))
    }

    pub fn reduce_columnwise(&self, monoid: Monoid) -> Result<Meta> {
        self.require_rank(2, "reduce_columnwise")?;
        Ok(Meta::result(vec![self.shape[1]], self.reduced_dtype(monoid)))
    }

    pub fn apply(&self, op: &ApplyOp) -> Result<Meta> {
        if self.is_scalar() {
            return Err(BlockExprError::Unsupported(
                "apply is not defined for scalars".into(),
            ));
        }
        Ok(Meta::result(self.shape.clone(), op.result_dtype(self.dtype)))
    }

    /// Shared rule of `ewise_add` and `ewise_mult`.
    pub fn ewise(&self, other: &Meta, op: BinaryOp) -> Result<Meta> {
        if self.is_scalar() {
            return Err(BlockExprError::Unsupported(
                "elementwise operations are not defined for scalars".into(),
            ));
        }
        if self.shape != other.shape {
            return Err(shape_mismatch(&self.shape, &other.shape));
        }
        Ok(Meta::result(
            self.shape.clone(),
            op.result_dtype(self.dtype, other.dtype),
        ))
    }

    pub fn mxv(&self, other: &Meta, semiring: Semiring) -> Result<Meta> {
        self.require_rank(2, "mxv")?;
        other.require_rank(1, "mxv right operand")?;
        if self.shape[1] != other.shape[0] {
            return Err(shape_mismatch(&[self.shape[1]], &[other.shape[0]]));
        }
        Ok(Meta::result(
            vec![self.shape[0]],
            semiring.result_dtype(self.dtype, other.dtype),
        ))
    }

    pub fn vxm(&self, other: &Meta, semiring: Semiring) -> Result<Meta> {
        self.require_rank(1, "vxm")?;
        other.require_rank(2, "vxm right operand")?;
        if self.shape[0] != other.shape[0] {
            return Err(shape_mismatch(&[self.shape[0]], &[other.shape[0]]));
        }
        Ok(Meta::result(
            vec![other.shape[1]],
            semiring.result_dtype(self.dtype, other.dtype),
        ))
    }

    pub fn mxm(&self, other: &Meta, semiring: Semiring) -> Result<Meta> {
        self.require_rank(2, "mxm")?;
        other.require_rank(2, "mxm right operand")?;
        if self.shape[1] != other.shape[0] {
            return Err(shape_mismatch(&[self.shape[1]], &[other.shape[0]]));
        }
        Ok(Meta::result(
            vec![self.shape[0], other.shape[1]],
            semiring.result_dtype(self.dtype, other.dtype),
        ))
    }

    /// Result of materialising into a fresh object.
    pub fn new_object(&self, dtype: Option<DType>, mask: Option<&Meta>) -> Result<Meta> {
        if let Some(mask) = mask {
            if mask.shape != self.shape {
                return Err(shape_mismatch(&self.shape, &mask.shape));
            }
        }
        Ok(Meta::result(self.shape.clone(), dtype.unwrap_or(self.dtype)))
    }

    /// Target metadata after a qualified write of `source`.
    ///
    /// The target keeps its shape and dtype. A mask is ignored for scalar
    /// targets.
    pub fn update(
        &self,
        source: &Meta,
        mask: Option<&Meta>,
        _accum: Option<BinaryOp>,
        replace: Option<bool>,
    ) -> Result<Meta> {
        if source.shape != self.shape {
            return Err(shape_mismatch(&self.shape, &source.shape));
        }
        match mask {
            Some(mask) if !self.is_scalar() && mask.shape != self.shape => {
                return Err(shape_mismatch(&self.shape, &mask.shape));
            }
            None if replace == Some(true) => {
                return Err(BlockExprError::Usage(
                    "replace requires a mask".into(),
                ));
            }
            _ => {}
        }
        Ok(Meta::result(self.shape.clone(), self.dtype))
    }

    /// Shape after indexing with one key per axis.
    pub fn index(&self, keys: &[Index]) -> Result<Meta> {
        if keys.len() != self.ndim() {
            return Err(BlockExprError::Usage(format!(
                "expected {} index keys, got {}",
                self.ndim(),
                keys.len()
            )));
        }
        let mut shape = Vec::with_capacity(keys.len());
        for (key, &size) in keys.iter().zip(&self.shape) {
            let len = key.len(size)?;
            if !key.is_scalar() {
                shape.push(len);
            }
        }
        let nvals = if self.nvals == Some(0) { Some(0) } else { None };
        Ok(Meta::new(shape, self.dtype, nvals))
    }

    /// All values removed; shape and dtype unchanged.
    pub fn clear(&self) -> Meta {
        Meta::new(self.shape.clone(), self.dtype, Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparse_kernels::UnaryOp;

    fn matrix(nrows: usize, ncols: usize, dtype: DType) -> Meta {
        Meta::new(vec![nrows, ncols], dtype, None)
    }

    fn vector(size: usize, dtype: DType) -> Meta {
        Meta::new(vec![size], dtype, None)
    }

    #[test]
    fn test_multiply_shapes() {
        let a = matrix(3, 4, DType::Int64);
        let v = vector(4, DType::Fp64);
        let out = a.mxv(&v, Semiring::plus_times()).unwrap();
        assert_eq!(out.shape(), &[3]);
        assert_eq!(out.dtype(), DType::Fp64);

        let u = vector(3, DType::Int64);
        assert_eq!(u.vxm(&a, Semiring::plus_times()).unwrap().shape(), &[4]);
        assert!(matches!(
            v.vxm(&a, Semiring::plus_times()),
            Err(BlockExprError::Backend(KernelError::DimensionMismatch { .. }))
        ));
        assert!(matches!(
            a.mxv(&a, Semiring::plus_times()),
            Err(BlockExprError::Unsupported(_))
        ));
    }

    #[test]
    fn test_reductions() {
        let a = matrix(3, 4, DType::Bool);
        assert_eq!(a.reduce_rowwise(Monoid::PLUS).unwrap().shape(), &[3]);
        assert_eq!(a.reduce_columnwise(Monoid::PLUS).unwrap().shape(), &[4]);
        assert!(a.reduce_scalar(Monoid::LOR).unwrap().is_scalar());
        assert!(matches!(
            a.reduce(Monoid::PLUS),
            Err(BlockExprError::Unsupported(_))
        ));
    }

    #[test]
    fn test_update_rules() {
        let w = vector(3, DType::Fp64);
        let src = vector(3, DType::Int64);
        let updated = w.update(&src, Some(&vector(3, DType::Bool)), None, Some(true)).unwrap();
        assert_eq!(updated.dtype(), DType::Fp64);
        assert!(matches!(
            w.update(&src, None, None, Some(true)),
            Err(BlockExprError::Usage(_))
        ));
        assert!(w.update(&vector(4, DType::Fp64), None, None, None).is_err());
        assert!(w
            .update(&src, Some(&vector(2, DType::Bool)), None, Some(false))
            .is_err());
    }

    #[test]
    fn test_index_drops_scalar_axes() {
        let a = matrix(5, 6, DType::Fp64);
        let row = a.index(&[Index::At(2), Index::Range(1..4)]).unwrap();
        assert_eq!(row.shape(), &[3]);
        assert!(a.index(&[Index::At(5), Index::All]).is_err());
        assert!(matches!(a.index(&[Index::All]), Err(BlockExprError::Usage(_))));
    }

    #[test]
    fn test_apply_and_new() {
        let a = matrix(2, 2, DType::Int64);
        let out = a.apply(&UnaryOp::One.into()).unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        let fresh = out.new_object(Some(DType::Fp64), None).unwrap();
        assert_eq!(fresh.dtype(), DType::Fp64);
        assert!(out
            .new_object(None, Some(&matrix(2, 3, DType::Bool)))
            .is_err());
        assert_eq!(a.clear().nvals(), Some(0));
    }
}
