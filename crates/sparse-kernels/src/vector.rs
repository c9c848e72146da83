//! Sparse vectors.

use std::sync::Arc;

use crate::dtype::{DType, Scalar};
use crate::error::{KernelError, Result};
use crate::index::{Extracted, Index};
use crate::mask::VectorMask;
use crate::merge::{intersect_with, qualified_merge, union_with};
use crate::ops::{ApplyOp, BinaryOp, Monoid};
use crate::scalar::SparseScalar;

/// Raw sparse-format contents of a vector.
///
/// The arrays are shared with the vector they were exported from.
#[derive(Debug, Clone)]
pub struct RawVector {
    pub size: usize,
    pub dtype: DType,
    pub indices: Arc<[usize]>,
    pub values: Arc<[Scalar]>,
}

impl RawVector {
    pub fn nvals(&self) -> usize {
        self.indices.len()
    }
}

/// A sparse vector: sorted unique indices with one value each.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    size: usize,
    dtype: DType,
    indices: Arc<[usize]>,
    values: Arc<[Scalar]>,
}

impl SparseVector {
    /// An empty vector.
    pub fn new(dtype: DType, size: usize) -> Self {
        Self {
            size,
            dtype,
            indices: Arc::from(Vec::new()),
            values: Arc::from(Vec::new()),
        }
    }

    /// Build from explicit index/value arrays.
    ///
    /// Without an explicit `dtype`, the common dtype of the values is used
    /// (`Fp64` for an empty vector).
    ///
    /// # Errors
    /// Mismatched array lengths, out-of-range or duplicate indices.
    pub fn from_values(
        indices: Vec<usize>,
        values: Vec<Scalar>,
        size: usize,
        dtype: Option<DType>,
    ) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(KernelError::InvalidStorage(format!(
                "{} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        let dtype = dtype.unwrap_or_else(|| {
            values
                .iter()
                .map(Scalar::dtype)
                .reduce(DType::unify)
                .unwrap_or(DType::Fp64)
        });
        let mut entries: Vec<(usize, Scalar)> = indices.into_iter().zip(values).collect();
        entries.sort_by_key(|&(i, _)| i);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(KernelError::DuplicateIndex(vec![pair[0].0]));
            }
        }
        if let Some(&(index, _)) = entries.last() {
            if index >= size {
                return Err(KernelError::IndexOutOfBounds { index, size });
            }
        }
        let entries = entries.into_iter().map(|(i, v)| (i, v.cast(dtype))).collect();
        Ok(Self::from_entries(size, dtype, entries))
    }

    /// Build from sorted, unique, already cast entries.
    pub(crate) fn from_entries(size: usize, dtype: DType, entries: Vec<(usize, Scalar)>) -> Self {
        let (indices, values): (Vec<usize>, Vec<Scalar>) = entries.into_iter().unzip();
        Self {
            size,
            dtype,
            indices: Arc::from(indices),
            values: Arc::from(values),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn nvals(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        self.indices
            .binary_search(&index)
            .ok()
            .map(|pos| self.values[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Scalar)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub(crate) fn entries(&self) -> Vec<(usize, Scalar)> {
        self.iter().collect()
    }

    /// Copy with an optional dtype change; storage is shared when the dtype
    /// is unchanged.
    pub fn dup(&self, dtype: Option<DType>) -> Self {
        match dtype {
            Some(dtype) if dtype != self.dtype => Self {
                size: self.size,
                dtype,
                indices: Arc::clone(&self.indices),
                values: self.values.iter().map(|v| v.cast(dtype)).collect(),
            },
            _ => self.clone(),
        }
    }

    fn check_size(&self, other: &SparseVector) -> Result<()> {
        if self.size != other.size {
            return Err(KernelError::DimensionMismatch {
                expected: vec![self.size],
                actual: vec![other.size],
            });
        }
        Ok(())
    }

    /// Elementwise union with `op` on shared positions.
    pub fn ewise_add(&self, other: &SparseVector, op: BinaryOp) -> Result<SparseVector> {
        self.check_size(other)?;
        let dtype = op.result_dtype(self.dtype, other.dtype);
        let entries = union_with(&self.entries(), &other.entries(), op, dtype)?;
        Ok(Self::from_entries(self.size, dtype, entries))
    }

    /// Elementwise intersection.
    pub fn ewise_mult(&self, other: &SparseVector, op: BinaryOp) -> Result<SparseVector> {
        self.check_size(other)?;
        let dtype = op.result_dtype(self.dtype, other.dtype);
        let entries = intersect_with(&self.entries(), &other.entries(), op, dtype)?;
        Ok(Self::from_entries(self.size, dtype, entries))
    }

    pub fn apply(&self, op: &ApplyOp) -> Result<SparseVector> {
        let dtype = op.result_dtype(self.dtype);
        let values = self
            .values
            .iter()
            .map(|&v| op.apply(v).map(|x| x.cast(dtype)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            size: self.size,
            dtype,
            indices: Arc::clone(&self.indices),
            values: Arc::from(values),
        })
    }

    /// Fold every stored value with `monoid`; empty when nothing is stored.
    pub fn reduce(&self, monoid: Monoid) -> Result<SparseScalar> {
        let dtype = monoid.op().result_dtype(self.dtype, self.dtype);
        let mut acc: Option<Scalar> = None;
        for &v in self.values.iter() {
            acc = Some(match acc {
                Some(a) => monoid.apply(a, v)?,
                None => v,
            });
        }
        Ok(SparseScalar::with_value(dtype, acc))
    }

    /// Gather `positions` into a new vector of length `positions.len()`.
    pub fn extract_positions(&self, positions: &[usize]) -> Result<SparseVector> {
        let mut entries = Vec::new();
        for (out, &src) in positions.iter().enumerate() {
            if src >= self.size {
                return Err(KernelError::IndexOutOfBounds {
                    index: src,
                    size: self.size,
                });
            }
            if let Some(v) = self.get(src) {
                entries.push((out, v));
            }
        }
        Ok(Self::from_entries(positions.len(), self.dtype, entries))
    }

    pub fn extract(&self, index: &Index) -> Result<Extracted> {
        match index {
            Index::At(i) => {
                let positions = index.resolve(self.size)?;
                debug_assert_eq!(positions, vec![*i]);
                Ok(Extracted::Scalar(SparseScalar::with_value(
                    self.dtype,
                    self.get(*i),
                )))
            }
            _ => Ok(Extracted::Vector(
                self.extract_positions(&index.resolve(self.size)?)?,
            )),
        }
    }

    /// Keep only the entries the mask allows.
    pub fn masked(&self, mask: &VectorMask<'_>) -> Result<SparseVector> {
        self.check_size(mask.vector)?;
        let entries = qualified_merge(
            &[],
            &self.entries(),
            |i| mask.allows(i),
            None,
            false,
            self.dtype,
        )?;
        Ok(Self::from_entries(self.size, self.dtype, entries))
    }

    /// Write `source` into this vector under a mask, accumulator and replace
    /// flag. This vector keeps its dtype.
    pub fn assign_qualified(
        &mut self,
        source: &SparseVector,
        mask: Option<&VectorMask<'_>>,
        accum: Option<BinaryOp>,
        replace: bool,
    ) -> Result<()> {
        self.check_size(source)?;
        if let Some(mask) = mask {
            self.check_size(mask.vector)?;
        }
        let entries = qualified_merge(
            &self.entries(),
            &source.entries(),
            |i| mask.map_or(true, |m| m.allows(i)),
            accum,
            replace,
            self.dtype,
        )?;
        *self = Self::from_entries(self.size, self.dtype, entries);
        Ok(())
    }

    /// Export the raw sparse arrays without copying them.
    pub fn export_raw(&self) -> RawVector {
        RawVector {
            size: self.size,
            dtype: self.dtype,
            indices: Arc::clone(&self.indices),
            values: Arc::clone(&self.values),
        }
    }

    /// Adopt raw sparse arrays without copying them.
    ///
    /// # Errors
    /// Unsorted, duplicate or out-of-range indices, length mismatch, or
    /// values of another dtype.
    pub fn import_raw(raw: RawVector) -> Result<Self> {
        if raw.indices.len() != raw.values.len() {
            return Err(KernelError::InvalidStorage(format!(
                "{} indices but {} values",
                raw.indices.len(),
                raw.values.len()
            )));
        }
        if raw.indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(KernelError::InvalidStorage(
                "indices must be strictly increasing".into(),
            ));
        }
        if let Some(&index) = raw.indices.last() {
            if index >= raw.size {
                return Err(KernelError::IndexOutOfBounds {
                    index,
                    size: raw.size,
                });
            }
        }
        if let Some(v) = raw.values.iter().find(|v| v.dtype() != raw.dtype) {
            return Err(KernelError::DTypeMismatch {
                expected: raw.dtype,
                actual: v.dtype(),
            });
        }
        Ok(Self {
            size: raw.size,
            dtype: raw.dtype,
            indices: raw.indices,
            values: raw.values,
        })
    }

    /// Whether both vectors use the same index and value arrays.
    pub fn shares_storage_with(&self, other: &SparseVector) -> bool {
        Arc::ptr_eq(&self.indices, &other.indices) && Arc::ptr_eq(&self.values, &other.values)
    }

    /// Concatenate pieces end to end.
    pub fn concat(pieces: &[SparseVector]) -> Result<SparseVector> {
        let dtype = pieces
            .iter()
            .map(SparseVector::dtype)
            .reduce(DType::unify)
            .unwrap_or(DType::Fp64);
        let mut offset = 0;
        let mut entries = Vec::new();
        for piece in pieces {
            entries.extend(piece.iter().map(|(i, v)| (i + offset, v.cast(dtype))));
            offset += piece.size;
        }
        Ok(Self::from_entries(offset, dtype, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::MaskKind;

    fn ivec(pairs: &[(usize, i64)], size: usize) -> SparseVector {
        let (idx, vals): (Vec<_>, Vec<_>) =
            pairs.iter().map(|&(i, v)| (i, Scalar::Int64(v))).unzip();
        SparseVector::from_values(idx, vals, size, None).unwrap()
    }

    #[test]
    fn test_from_values_sorts_and_validates() {
        let v = ivec(&[(3, 1), (0, 2)], 4);
        assert_eq!(v.indices(), &[0, 3]);
        assert_eq!(v.get(3), Some(Scalar::Int64(1)));
        assert!(SparseVector::from_values(vec![1, 1], vec![1i64.into(), 2i64.into()], 3, None)
            .is_err());
        assert!(SparseVector::from_values(vec![3], vec![1i64.into()], 3, None).is_err());
    }

    #[test]
    fn test_reduce_empty_is_empty() {
        let v = SparseVector::new(DType::Int64, 4);
        assert!(v.reduce(Monoid::PLUS).unwrap().is_empty());
        let w = ivec(&[(0, 2), (2, 5)], 4);
        assert_eq!(
            w.reduce(Monoid::MAX).unwrap().value(),
            Some(Scalar::Int64(5))
        );
    }

    #[test]
    fn test_extract_list_and_scalar() {
        let v = ivec(&[(0, 1), (2, 3)], 4);
        match v.extract(&Index::List(vec![2, 1, 0])).unwrap() {
            Extracted::Vector(w) => {
                assert_eq!(w.size(), 3);
                assert_eq!(w.get(0), Some(Scalar::Int64(3)));
                assert_eq!(w.get(1), None);
                assert_eq!(w.get(2), Some(Scalar::Int64(1)));
            }
            other => panic!("unexpected {other:?}"),
        }
        match v.extract(&Index::At(2)).unwrap() {
            Extracted::Scalar(s) => assert_eq!(s.value(), Some(Scalar::Int64(3))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_assign_qualified_with_mask_and_accum() {
        let mut target = ivec(&[(0, 1), (1, 1)], 3);
        let source = ivec(&[(0, 10), (1, 10), (2, 10)], 3);
        let mask_vec = ivec(&[(0, 1), (2, 1)], 3);
        let mask = VectorMask::new(&mask_vec, MaskKind::Structure);
        target
            .assign_qualified(&source, Some(&mask), Some(BinaryOp::Plus), false)
            .unwrap();
        assert_eq!(target, ivec(&[(0, 11), (1, 1), (2, 10)], 3));
    }

    #[test]
    fn test_raw_round_trip_shares_storage() {
        let v = ivec(&[(1, 4), (2, 5)], 3);
        let w = SparseVector::import_raw(v.export_raw()).unwrap();
        assert!(v.shares_storage_with(&w));
        assert_eq!(v, w);
    }

    #[test]
    fn test_concat_offsets_indices() {
        let a = ivec(&[(1, 1)], 2);
        let b = ivec(&[(0, 2)], 3);
        let c = SparseVector::concat(&[a, b]).unwrap();
        assert_eq!(c, ivec(&[(1, 1), (2, 2)], 5));
    }
}
