//! Write-qualified destinations.

use sparse_kernels::{BinaryOp, Index, KernelError};

use crate::error::{BlockExprError, Result};
use crate::expr::DeferredExpression;
use crate::indexer::LazyIndexer;
use crate::mask::Mask;
use crate::object::PartitionedObject;
use crate::options::WriteOptions;

/// A target object together with the mask, accumulator and replace flag of
/// a pending write.
///
/// The updater holds the target exclusively until it is dropped, so no one
/// can read the target while a write is in flight.
///
/// # Example
///
/// ```
/// use block_expr::{BlockPartition, PartitionedObject, WriteOptions};
/// use sparse_kernels::{BinaryOp, DType, Scalar, SparseVector};
///
/// let v = SparseVector::from_values(vec![1], vec![Scalar::Int64(3)], 4, None).unwrap();
/// let u = PartitionedObject::from_vector(&v, BlockPartition::split(4, 2)).unwrap();
/// let mut w = PartitionedObject::new_vector(DType::Int64, BlockPartition::split(4, 2));
///
/// let expr = u.ewise_add(&u, BinaryOp::Plus).unwrap();
/// let opts = WriteOptions::default().with_accum(BinaryOp::Plus);
/// w.updater(opts.clone()).unwrap().write(&expr).unwrap();
/// w.updater(opts).unwrap().write(&expr).unwrap();
/// assert_eq!(w.to_vector().unwrap().get(1), Some(Scalar::Int64(12)));
/// ```
#[derive(Debug)]
pub struct Updater<'a> {
    target: &'a mut PartitionedObject,
    mask: Option<Mask>,
    accum: Option<BinaryOp>,
    replace: Option<bool>,
    levels: Vec<Vec<Index>>,
}

impl<'a> Updater<'a> {
    /// # Errors
    /// - [`BlockExprError::Usage`] if `replace` is requested without a mask.
    /// - [`BlockExprError::Backend`] if the mask shape differs from the
    ///   target shape.
    pub(crate) fn new(target: &'a mut PartitionedObject, opts: WriteOptions) -> Result<Self> {
        let WriteOptions {
            mask,
            accum,
            replace,
        } = opts;
        let replace = match (&mask, replace) {
            (None, Some(true)) => {
                return Err(BlockExprError::Usage("replace requires a mask".into()));
            }
            (None, _) => None,
            (Some(_), replace) => Some(replace.unwrap_or(false)),
        };
        if let Some(mask) = &mask {
            if !target.meta().is_scalar() && mask.meta().shape() != target.shape() {
                return Err(KernelError::DimensionMismatch {
                    expected: target.shape().to_vec(),
                    actual: mask.meta().shape().to_vec(),
                }
                .into());
            }
        }
        Ok(Self {
            target,
            mask,
            accum,
            replace,
            levels: Vec::new(),
        })
    }

    /// Scope this updater to the index levels of an indexer.
    pub(crate) fn with_levels(mut self, levels: Vec<Vec<Index>>) -> Self {
        self.levels = levels;
        self
    }

    pub fn target(&self) -> &PartitionedObject {
        &*self.target
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn accum(&self) -> Option<BinaryOp> {
        self.accum
    }

    /// `None` when no mask was given.
    pub fn replace(&self) -> Option<bool> {
        self.replace
    }

    /// The qualifiers as options.
    pub fn options(&self) -> WriteOptions {
        WriteOptions {
            mask: self.mask.clone(),
            accum: self.accum,
            replace: self.replace,
        }
    }

    /// Record an index on the target; whether it is read or written is
    /// decided by what is done with the returned indexer.
    pub fn index(&self, keys: Vec<Index>) -> Result<LazyIndexer> {
        let mut levels = self.levels.clone();
        levels.push(keys);
        LazyIndexer::from_levels(self.target.clone(), levels, Some(self.options()))
    }

    /// Whether every recorded index level selects the whole target.
    fn is_unindexed(&self) -> bool {
        let shape = self.target.shape();
        self.levels.iter().all(|keys| {
            keys.len() == shape.len() && keys.iter().zip(shape).all(|(k, &n)| k.is_full(n))
        })
    }

    /// Write `expr` into the target under the recorded qualifiers.
    ///
    /// # Errors
    /// [`BlockExprError::Unsupported`] for writes through a non-trivial
    /// index.
    pub fn write(&mut self, expr: &DeferredExpression) -> Result<()> {
        if !self.is_unindexed() {
            return Err(BlockExprError::Unsupported(
                "writes through an index".into(),
            ));
        }
        if self.mask.is_none() && self.accum.is_none() {
            return self.target.update(expr);
        }
        self.target.meta().update(
            expr.meta(),
            self.mask.as_ref().map(Mask::meta),
            self.accum,
            self.replace,
        )?;
        if self.target.meta().is_scalar() {
            expr.write_into(self.target, None, self.accum, false)
        } else {
            expr.write_into(
                self.target,
                self.mask.as_ref(),
                self.accum,
                self.replace.unwrap_or(false),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::BlockPartition;
    use sparse_kernels::{DType, Monoid, Scalar, SparseVector};

    fn object(values: &[(usize, i64)], size: usize) -> PartitionedObject {
        let v = SparseVector::from_values(
            values.iter().map(|&(i, _)| i).collect(),
            values.iter().map(|&(_, x)| Scalar::Int64(x)).collect(),
            size,
            Some(DType::Int64),
        )
        .unwrap();
        PartitionedObject::from_vector(&v, BlockPartition::split(size, 2)).unwrap()
    }

    #[test]
    fn test_replace_defaults() {
        let mut w = object(&[], 3);
        let mask = object(&[(0, 1)], 3).value_mask();
        let up = w.updater(WriteOptions::default().with_mask(mask)).unwrap();
        assert_eq!(up.replace(), Some(false));
        drop(up);

        let up = w.updater(WriteOptions::default().with_replace(false)).unwrap();
        assert_eq!(up.replace(), None);
        drop(up);

        assert!(matches!(
            w.updater(WriteOptions::default().with_replace(true)),
            Err(BlockExprError::Usage(_))
        ));
    }

    #[test]
    fn test_mask_shape_checked() {
        let mut w = object(&[], 3);
        let mask = object(&[], 4).structure_mask();
        assert!(matches!(
            w.updater(WriteOptions::default().with_mask(mask)),
            Err(BlockExprError::Backend(_))
        ));
    }

    #[test]
    fn test_masked_write_keeps_unselected() {
        let u = object(&[(0, 1), (1, 2), (2, 3)], 3);
        let mut w = object(&[(0, 9), (2, 9)], 3);
        let mask = object(&[(1, 1), (2, 1)], 3).structure_mask();
        let expr = u.apply(sparse_kernels::UnaryOp::Identity).unwrap();
        w.updater(WriteOptions::default().with_mask(mask))
            .unwrap()
            .write(&expr)
            .unwrap();
        let v = w.to_vector().unwrap();
        assert_eq!(v.get(0), Some(Scalar::Int64(9)));
        assert_eq!(v.get(1), Some(Scalar::Int64(2)));
        assert_eq!(v.get(2), Some(Scalar::Int64(3)));
    }

    #[test]
    fn test_scalar_target_ignores_mask() {
        let u = object(&[(0, 1), (1, 2)], 3);
        let mut s = PartitionedObject::from_scalar(sparse_kernels::SparseScalar::new(DType::Int64));
        let mask = object(&[], 3).structure_mask();
        s.updater(
            WriteOptions::default()
                .with_mask(mask)
                .with_accum(BinaryOp::Plus),
        )
        .unwrap()
        .write(&u.reduce(Monoid::PLUS).unwrap())
        .unwrap();
        assert_eq!(s.value().unwrap(), Some(Scalar::Int64(3)));
    }

    #[test]
    fn test_indexed_write_is_unsupported() {
        let u = object(&[(0, 1)], 2);
        let mut w = object(&[], 4);
        let expr = u.apply(sparse_kernels::UnaryOp::Identity).unwrap();
        let indexer = w.index(vec![Index::Range(0..2)]).unwrap();
        let mut up = indexer.as_writable(&mut w, None).unwrap();
        assert!(matches!(
            up.write(&expr),
            Err(BlockExprError::Unsupported(_))
        ));
    }

    #[test]
    fn test_full_slice_write_delegates() {
        let u = object(&[(0, 1)], 2);
        let mut w = object(&[(1, 4)], 2);
        let expr = u.apply(sparse_kernels::UnaryOp::Identity).unwrap();
        let indexer = w.index(vec![Index::All]).unwrap();
        indexer.as_writable(&mut w, None).unwrap().write(&expr).unwrap();
        assert_eq!(w.to_vector().unwrap(), u.to_vector().unwrap());
    }
}
