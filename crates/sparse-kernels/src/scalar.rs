//! Possibly empty 0-dimensional values.

use crate::dtype::{DType, Scalar};
use crate::error::Result;
use crate::ops::BinaryOp;

/// A 0-dimensional sparse value: either one stored value or nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseScalar {
    dtype: DType,
    value: Option<Scalar>,
}

impl SparseScalar {
    /// An empty scalar of the given dtype.
    pub fn new(dtype: DType) -> Self {
        Self { dtype, value: None }
    }

    pub fn from_value(value: Scalar) -> Self {
        Self {
            dtype: value.dtype(),
            value: Some(value),
        }
    }

    pub(crate) fn with_value(dtype: DType, value: Option<Scalar>) -> Self {
        Self {
            dtype,
            value: value.map(|v| v.cast(dtype)),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn value(&self) -> Option<Scalar> {
        self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn nvals(&self) -> usize {
        usize::from(self.value.is_some())
    }

    pub fn dup(&self, dtype: Option<DType>) -> Self {
        Self::with_value(dtype.unwrap_or(self.dtype), self.value)
    }

    /// Combine `other` into this value with `accum`, keeping this dtype.
    ///
    /// An empty operand acts as the identity of `accum`.
    pub fn accumulate(&self, other: &SparseScalar, accum: BinaryOp) -> Result<SparseScalar> {
        let value = match (self.value, other.value) {
            (Some(a), Some(b)) => Some(accum.apply(a, b)?),
            (a, b) => a.or(b),
        };
        Ok(Self::with_value(self.dtype, value))
    }

    /// Overwrite (or accumulate into) this value.
    pub fn assign(&mut self, source: &SparseScalar, accum: Option<BinaryOp>) -> Result<()> {
        *self = match accum {
            Some(op) => self.accumulate(source, op)?,
            None => Self::with_value(self.dtype, source.value),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_empty_is_identity() {
        let empty = SparseScalar::new(DType::Int64);
        let five = SparseScalar::from_value(Scalar::Int64(5));
        assert_eq!(
            empty.accumulate(&five, BinaryOp::Times).unwrap().value(),
            Some(Scalar::Int64(5))
        );
        assert_eq!(
            five.accumulate(&empty, BinaryOp::Minus).unwrap().value(),
            Some(Scalar::Int64(5))
        );
        assert!(empty
            .accumulate(&SparseScalar::new(DType::Int64), BinaryOp::Plus)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_assign_keeps_target_dtype() {
        let mut target = SparseScalar::new(DType::Fp64);
        target
            .assign(&SparseScalar::from_value(Scalar::Int64(3)), None)
            .unwrap();
        assert_eq!(target.value(), Some(Scalar::Fp64(3.0)));
    }
}
