//! Sparse matrices in compressed row or column storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::dtype::{DType, Scalar};
use crate::error::{KernelError, Result};
use crate::index::{Extracted, Index};
use crate::mask::MatrixMask;
use crate::merge::{intersect_with, qualified_merge, union_with};
use crate::ops::{ApplyOp, BinaryOp, Monoid, Semiring};
use crate::scalar::SparseScalar;
use crate::vector::SparseVector;

/// Position of a stored entry.
type Pos = (usize, usize);

/// Compression axis of the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// CSR: `indptr` runs over rows, `indices` hold columns.
    RowMajor,
    /// CSC: `indptr` runs over columns, `indices` hold rows.
    ColMajor,
}

/// Raw compressed contents of a matrix.
///
/// The arrays are shared with the matrix they were exported from whenever
/// the requested orientation matches the storage.
#[derive(Debug, Clone)]
pub struct RawCompressed {
    pub nrows: usize,
    pub ncols: usize,
    pub dtype: DType,
    pub indptr: Arc<[usize]>,
    pub indices: Arc<[usize]>,
    pub values: Arc<[Scalar]>,
}

/// A sparse matrix.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    dtype: DType,
    orientation: Orientation,
    indptr: Arc<[usize]>,
    indices: Arc<[usize]>,
    values: Arc<[Scalar]>,
}

impl PartialEq for SparseMatrix {
    /// Logical equality, independent of orientation.
    fn eq(&self, other: &Self) -> bool {
        self.nrows == other.nrows
            && self.ncols == other.ncols
            && self.dtype == other.dtype
            && self.entries() == other.entries()
    }
}

impl SparseMatrix {
    /// An empty matrix.
    pub fn new(dtype: DType, nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            dtype,
            orientation: Orientation::RowMajor,
            indptr: Arc::from(vec![0; nrows + 1]),
            indices: Arc::from(Vec::new()),
            values: Arc::from(Vec::new()),
        }
    }

    /// Build from coordinate arrays.
    ///
    /// # Errors
    /// Mismatched array lengths, out-of-range or duplicate positions.
    pub fn from_values(
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<Scalar>,
        nrows: usize,
        ncols: usize,
        dtype: Option<DType>,
    ) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(KernelError::InvalidStorage(format!(
                "{} rows, {} cols and {} values",
                rows.len(),
                cols.len(),
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
        let mut entries = Vec::with_capacity(values.len());
        for ((r, c), v) in rows.into_iter().zip(cols).zip(values) {
            if r >= nrows {
                return Err(KernelError::IndexOutOfBounds {
                    index: r,
                    size: nrows,
                });
            }
            if c >= ncols {
                return Err(KernelError::IndexOutOfBounds {
                    index: c,
                    size: ncols,
                });
            }
            entries.push(((r, c), v.cast(dtype)));
        }
        entries.sort_by_key(|&(pos, _)| pos);
        for pair in entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(KernelError::DuplicateIndex(vec![pair[0].0 .0, pair[0].0 .1]));
            }
        }
        Ok(Self::from_entries(nrows, ncols, dtype, entries))
    }

    /// Build CSR storage from row-major sorted, unique, already cast entries.
    pub(crate) fn from_entries(
        nrows: usize,
        ncols: usize,
        dtype: DType,
        entries: Vec<(Pos, Scalar)>,
    ) -> Self {
        let mut indptr = vec![0; nrows + 1];
        for &((r, _), _) in &entries {
            indptr[r + 1] += 1;
        }
        for r in 0..nrows {
            indptr[r + 1] += indptr[r];
        }
        let (indices, values): (Vec<usize>, Vec<Scalar>) =
            entries.into_iter().map(|((_, c), v)| (c, v)).unzip();
        Self {
            nrows,
            ncols,
            dtype,
            orientation: Orientation::RowMajor,
            indptr: Arc::from(indptr),
            indices: Arc::from(indices),
            values: Arc::from(values),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.nrows, self.ncols]
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn nvals(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries of major slot `major` as `(minor, value)` pairs.
    fn slot(&self, major: usize) -> impl Iterator<Item = (usize, Scalar)> + '_ {
        let range = self.indptr[major]..self.indptr[major + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Scalar> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        let (major, minor) = match self.orientation {
            Orientation::RowMajor => (row, col),
            Orientation::ColMajor => (col, row),
        };
        let start = self.indptr[major];
        let end = self.indptr[major + 1];
        self.indices[start..end]
            .binary_search(&minor)
            .ok()
            .map(|pos| self.values[start + pos])
    }

    /// All stored entries in row-major order.
    pub fn entries(&self) -> Vec<(Pos, Scalar)> {
        match self.orientation {
            Orientation::RowMajor => (0..self.nrows)
                .flat_map(|r| self.slot(r).map(move |(c, v)| ((r, c), v)))
                .collect(),
            Orientation::ColMajor => {
                let mut entries: Vec<(Pos, Scalar)> = (0..self.ncols)
                    .flat_map(|c| self.slot(c).map(move |(r, v)| ((r, c), v)))
                    .collect();
                entries.sort_by_key(|&(pos, _)| pos);
                entries
            }
        }
    }

    /// Entries of row `row`, sorted by column.
    pub fn row(&self, row: usize) -> Vec<(usize, Scalar)> {
        match self.orientation {
            Orientation::RowMajor => self.slot(row).collect(),
            Orientation::ColMajor => (0..self.ncols)
                .filter_map(|c| self.get(row, c).map(|v| (c, v)))
                .collect(),
        }
    }

    pub fn dup(&self, dtype: Option<DType>) -> Self {
        match dtype {
            Some(dtype) if dtype != self.dtype => Self {
                dtype,
                values: self.values.iter().map(|v| v.cast(dtype)).collect(),
                indptr: Arc::clone(&self.indptr),
                indices: Arc::clone(&self.indices),
                ..*self
            },
            _ => self.clone(),
        }
    }

    fn check_shape(&self, other: [usize; 2]) -> Result<()> {
        if self.shape() != other {
            return Err(KernelError::DimensionMismatch {
                expected: self.shape().to_vec(),
                actual: other.to_vec(),
            });
        }
        Ok(())
    }

    /// Elementwise union with `op` on shared positions.
    pub fn ewise_add(&self, other: &SparseMatrix, op: BinaryOp) -> Result<SparseMatrix> {
        self.check_shape(other.shape())?;
        let dtype = op.result_dtype(self.dtype, other.dtype);
        let entries = union_with(&self.entries(), &other.entries(), op, dtype)?;
        Ok(Self::from_entries(self.nrows, self.ncols, dtype, entries))
    }

    /// Elementwise intersection.
    pub fn ewise_mult(&self, other: &SparseMatrix, op: BinaryOp) -> Result<SparseMatrix> {
        self.check_shape(other.shape())?;
        let dtype = op.result_dtype(self.dtype, other.dtype);
        let entries = intersect_with(&self.entries(), &other.entries(), op, dtype)?;
        Ok(Self::from_entries(self.nrows, self.ncols, dtype, entries))
    }

    pub fn apply(&self, op: &ApplyOp) -> Result<SparseMatrix> {
        let dtype = op.result_dtype(self.dtype);
        let values = self
            .values
            .iter()
            .map(|&v| op.apply(v).map(|x| x.cast(dtype)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dtype,
            indptr: Arc::clone(&self.indptr),
            indices: Arc::clone(&self.indices),
            values: Arc::from(values),
            ..*self
        })
    }

    fn fold_by<K: Ord>(
        &self,
        monoid: Monoid,
        key: impl Fn(Pos) -> K,
    ) -> Result<BTreeMap<K, Scalar>> {
        let mut acc: BTreeMap<K, Scalar> = BTreeMap::new();
        for (pos, v) in self.entries() {
            let k = key(pos);
            let z = match acc.get(&k) {
                Some(&a) => monoid.apply(a, v)?,
                None => v,
            };
            acc.insert(k, z);
        }
        Ok(acc)
    }

    fn reduced_dtype(&self, monoid: Monoid) -> DType {
        monoid.op().result_dtype(self.dtype, self.dtype)
    }

    /// One entry per nonempty row.
    pub fn reduce_rowwise(&self, monoid: Monoid) -> Result<SparseVector> {
        let dtype = self.reduced_dtype(monoid);
        let acc = self.fold_by(monoid, |(r, _)| r)?;
        let entries = acc.into_iter().map(|(r, v)| (r, v.cast(dtype))).collect();
        Ok(SparseVector::from_entries(self.nrows, dtype, entries))
    }

    /// One entry per nonempty column.
    pub fn reduce_columnwise(&self, monoid: Monoid) -> Result<SparseVector> {
        let dtype = self.reduced_dtype(monoid);
        let acc = self.fold_by(monoid, |(_, c)| c)?;
        let entries = acc.into_iter().map(|(c, v)| (c, v.cast(dtype))).collect();
        Ok(SparseVector::from_entries(self.ncols, dtype, entries))
    }

    /// Fold every stored value; empty when nothing is stored.
    pub fn reduce_scalar(&self, monoid: Monoid) -> Result<SparseScalar> {
        let dtype = self.reduced_dtype(monoid);
        let mut acc: Option<Scalar> = None;
        for &v in self.values.iter() {
            acc = Some(match acc {
                Some(a) => monoid.apply(a, v)?,
                None => v,
            });
        }
        Ok(SparseScalar::with_value(dtype, acc))
    }

    /// Matrix product over `semiring`, cast to `dtype` when given.
    pub fn mxm(
        &self,
        other: &SparseMatrix,
        semiring: Semiring,
        dtype: Option<DType>,
    ) -> Result<SparseMatrix> {
        if self.ncols != other.nrows {
            return Err(KernelError::DimensionMismatch {
                expected: vec![self.ncols],
                actual: vec![other.nrows],
            });
        }
        let dtype = dtype.unwrap_or_else(|| semiring.result_dtype(self.dtype, other.dtype));
        let rhs = other.export_csr();
        let monoid = semiring.monoid();
        let mut entries = Vec::new();
        for r in 0..self.nrows {
            let mut acc: BTreeMap<usize, Scalar> = BTreeMap::new();
            for (k, a) in self.row(r) {
                let range = rhs.indptr[k]..rhs.indptr[k + 1];
                for (&c, &b) in rhs.indices[range.clone()].iter().zip(&rhs.values[range]) {
                    let p = semiring.mul().apply(a, b)?;
                    let z = match acc.get(&c) {
                        Some(&prev) => monoid.apply(prev, p)?,
                        None => p,
                    };
                    acc.insert(c, z);
                }
            }
            entries.extend(acc.into_iter().map(|(c, v)| ((r, c), v.cast(dtype))));
        }
        Ok(Self::from_entries(self.nrows, other.ncols, dtype, entries))
    }

    /// Matrix-vector product (unpartitioned reference).
    pub fn mxv(&self, v: &SparseVector, semiring: Semiring) -> Result<SparseVector> {
        let col = v.as_column();
        let product = self.mxm(&col, semiring, None)?;
        let entries = product.entries().into_iter().map(|((r, _), x)| (r, x)).collect();
        Ok(SparseVector::from_entries(self.nrows, product.dtype, entries))
    }

    /// Vector-matrix product (unpartitioned reference).
    pub fn vxm(v: &SparseVector, m: &SparseMatrix, semiring: Semiring) -> Result<SparseVector> {
        let row = v.as_row();
        let product = row.mxm(m, semiring, None)?;
        let entries = product.entries().into_iter().map(|((_, c), x)| (c, x)).collect();
        Ok(SparseVector::from_entries(m.ncols, product.dtype, entries))
    }

    /// Gather the submatrix at `rows` x `cols` (positions may repeat).
    pub fn extract_positions(&self, rows: &[usize], cols: &[usize]) -> Result<SparseMatrix> {
        let mut col_targets: HashMap<usize, Vec<usize>> = HashMap::new();
        for (out, &src) in cols.iter().enumerate() {
            if src >= self.ncols {
                return Err(KernelError::IndexOutOfBounds {
                    index: src,
                    size: self.ncols,
                });
            }
            col_targets.entry(src).or_default().push(out);
        }
        let mut entries = Vec::new();
        for (out_r, &src_r) in rows.iter().enumerate() {
            if src_r >= self.nrows {
                return Err(KernelError::IndexOutOfBounds {
                    index: src_r,
                    size: self.nrows,
                });
            }
            let mut row_entries: Vec<(Pos, Scalar)> = self
                .row(src_r)
                .into_iter()
                .flat_map(|(c, v)| {
                    col_targets
                        .get(&c)
                        .into_iter()
                        .flatten()
                        .map(move |&out_c| ((out_r, out_c), v))
                })
                .collect();
            row_entries.sort_by_key(|&(pos, _)| pos);
            entries.extend(row_entries);
        }
        Ok(Self::from_entries(rows.len(), cols.len(), self.dtype, entries))
    }

    pub fn extract(&self, rows: &Index, cols: &Index) -> Result<Extracted> {
        let row_pos = rows.resolve(self.nrows)?;
        let col_pos = cols.resolve(self.ncols)?;
        let sub = self.extract_positions(&row_pos, &col_pos)?;
        Ok(match (rows.is_scalar(), cols.is_scalar()) {
            (true, true) => Extracted::Scalar(SparseScalar::with_value(sub.dtype, sub.get(0, 0))),
            (true, false) => {
                let entries = sub.row(0);
                Extracted::Vector(SparseVector::from_entries(sub.ncols, sub.dtype, entries))
            }
            (false, true) => {
                let entries = sub.entries().into_iter().map(|((r, _), v)| (r, v)).collect();
                Extracted::Vector(SparseVector::from_entries(sub.nrows, sub.dtype, entries))
            }
            (false, false) => Extracted::Matrix(sub),
        })
    }

    /// Keep only the entries the mask allows.
    pub fn masked(&self, mask: &MatrixMask<'_>) -> Result<SparseMatrix> {
        self.check_shape(mask.matrix.shape())?;
        let entries = qualified_merge(
            &[],
            &self.entries(),
            |(r, c)| mask.allows(r, c),
            None,
            false,
            self.dtype,
        )?;
        Ok(Self::from_entries(self.nrows, self.ncols, self.dtype, entries))
    }

    /// Write `source` into this matrix under a mask, accumulator and replace
    /// flag. This matrix keeps its dtype.
    pub fn assign_qualified(
        &mut self,
        source: &SparseMatrix,
        mask: Option<&MatrixMask<'_>>,
        accum: Option<BinaryOp>,
        replace: bool,
    ) -> Result<()> {
        self.check_shape(source.shape())?;
        if let Some(mask) = mask {
            self.check_shape(mask.matrix.shape())?;
        }
        let entries = qualified_merge(
            &self.entries(),
            &source.entries(),
            |(r, c)| mask.map_or(true, |m| m.allows(r, c)),
            accum,
            replace,
            self.dtype,
        )?;
        *self = Self::from_entries(self.nrows, self.ncols, self.dtype, entries);
        Ok(())
    }

    fn validate_compressed(
        nmajor: usize,
        nminor: usize,
        dtype: DType,
        indptr: &[usize],
        indices: &[usize],
        values: &[Scalar],
    ) -> Result<()> {
        if indptr.len() != nmajor + 1 || indptr.first() != Some(&0) {
            return Err(KernelError::InvalidStorage(format!(
                "indptr must have {} entries starting at 0",
                nmajor + 1
            )));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(KernelError::InvalidStorage(
                "indptr must be non-decreasing".into(),
            ));
        }
        if indptr[nmajor] != indices.len() || indices.len() != values.len() {
            return Err(KernelError::InvalidStorage(format!(
                "indptr ends at {} with {} indices and {} values",
                indptr[nmajor],
                indices.len(),
                values.len()
            )));
        }
        for w in indptr.windows(2) {
            let slot = &indices[w[0]..w[1]];
            if slot.windows(2).any(|p| p[0] >= p[1]) {
                return Err(KernelError::InvalidStorage(
                    "indices must be strictly increasing within a slot".into(),
                ));
            }
            if let Some(&index) = slot.last() {
                if index >= nminor {
                    return Err(KernelError::IndexOutOfBounds {
                        index,
                        size: nminor,
                    });
                }
            }
        }
        if let Some(v) = values.iter().find(|v| v.dtype() != dtype) {
            return Err(KernelError::DTypeMismatch {
                expected: dtype,
                actual: v.dtype(),
            });
        }
        Ok(())
    }

    /// Adopt CSR arrays without copying them.
    pub fn import_csr(raw: RawCompressed) -> Result<Self> {
        Self::validate_compressed(
            raw.nrows,
            raw.ncols,
            raw.dtype,
            &raw.indptr,
            &raw.indices,
            &raw.values,
        )?;
        Ok(Self {
            nrows: raw.nrows,
            ncols: raw.ncols,
            dtype: raw.dtype,
            orientation: Orientation::RowMajor,
            indptr: raw.indptr,
            indices: raw.indices,
            values: raw.values,
        })
    }

    /// Adopt CSC arrays without copying them.
    pub fn import_csc(raw: RawCompressed) -> Result<Self> {
        Self::validate_compressed(
            raw.ncols,
            raw.nrows,
            raw.dtype,
            &raw.indptr,
            &raw.indices,
            &raw.values,
        )?;
        Ok(Self {
            nrows: raw.nrows,
            ncols: raw.ncols,
            dtype: raw.dtype,
            orientation: Orientation::ColMajor,
            indptr: raw.indptr,
            indices: raw.indices,
            values: raw.values,
        })
    }

    fn raw(&self) -> RawCompressed {
        RawCompressed {
            nrows: self.nrows,
            ncols: self.ncols,
            dtype: self.dtype,
            indptr: Arc::clone(&self.indptr),
            indices: Arc::clone(&self.indices),
            values: Arc::clone(&self.values),
        }
    }

    /// CSR arrays; shared when the storage is already row-major.
    pub fn export_csr(&self) -> RawCompressed {
        match self.orientation {
            Orientation::RowMajor => self.raw(),
            Orientation::ColMajor => {
                Self::from_entries(self.nrows, self.ncols, self.dtype, self.entries()).raw()
            }
        }
    }

    /// CSC arrays; shared when the storage is already column-major.
    pub fn export_csc(&self) -> RawCompressed {
        match self.orientation {
            Orientation::ColMajor => self.raw(),
            Orientation::RowMajor => {
                let mut by_col = self.entries();
                by_col.sort_by_key(|&((r, c), _)| (c, r));
                let mut indptr = vec![0; self.ncols + 1];
                for &((_, c), _) in &by_col {
                    indptr[c + 1] += 1;
                }
                for c in 0..self.ncols {
                    indptr[c + 1] += indptr[c];
                }
                let (indices, values): (Vec<usize>, Vec<Scalar>) =
                    by_col.into_iter().map(|((r, _), v)| (r, v)).unzip();
                RawCompressed {
                    nrows: self.nrows,
                    ncols: self.ncols,
                    dtype: self.dtype,
                    indptr: Arc::from(indptr),
                    indices: Arc::from(indices),
                    values: Arc::from(values),
                }
            }
        }
    }

    /// Whether both matrices use the same index and value arrays.
    pub fn shares_storage_with(&self, other: &SparseMatrix) -> bool {
        Arc::ptr_eq(&self.indices, &other.indices) && Arc::ptr_eq(&self.values, &other.values)
    }

    /// Whether `vector`'s index and value arrays back this matrix.
    pub fn shares_storage_with_vector(&self, vector: &SparseVector) -> bool {
        let raw = vector.export_raw();
        Arc::ptr_eq(&self.indices, &raw.indices) && Arc::ptr_eq(&self.values, &raw.values)
    }

    /// Assemble a matrix from a grid of blocks (`grid[block_row][block_col]`).
    ///
    /// # Errors
    /// Blocks in one block row must share a height and blocks in one block
    /// column must share a width.
    pub fn concat_grid(grid: &[Vec<SparseMatrix>]) -> Result<SparseMatrix> {
        let ncols_blocks = grid.first().map_or(0, Vec::len);
        let widths: Vec<usize> = grid
            .first()
            .map(|row| row.iter().map(SparseMatrix::ncols).collect())
            .unwrap_or_default();
        let dtype = grid
            .iter()
            .flatten()
            .map(SparseMatrix::dtype)
            .reduce(DType::unify)
            .unwrap_or(DType::Fp64);
        let mut entries = Vec::new();
        let mut row_offset = 0;
        for block_row in grid {
            if block_row.len() != ncols_blocks {
                return Err(KernelError::DimensionMismatch {
                    expected: vec![ncols_blocks],
                    actual: vec![block_row.len()],
                });
            }
            let height = block_row.first().map_or(0, SparseMatrix::nrows);
            let mut col_offset = 0;
            let mut row_entries = Vec::new();
            for (block, &width) in block_row.iter().zip(&widths) {
                if block.nrows != height || block.ncols != width {
                    return Err(KernelError::DimensionMismatch {
                        expected: vec![height, width],
                        actual: block.shape().to_vec(),
                    });
                }
                row_entries.extend(
                    block
                        .entries()
                        .into_iter()
                        .map(|((r, c), v)| ((r + row_offset, c + col_offset), v.cast(dtype))),
                );
                col_offset += width;
            }
            row_entries.sort_by_key(|&(pos, _)| pos);
            entries.extend(row_entries);
            row_offset += height;
        }
        Ok(Self::from_entries(
            row_offset,
            widths.iter().sum(),
            dtype,
            entries,
        ))
    }
}

impl SparseVector {
    /// Copy into a 1 x n matrix.
    pub(crate) fn as_row(&self) -> SparseMatrix {
        let entries = self.iter().map(|(c, v)| ((0, c), v)).collect();
        SparseMatrix::from_entries(1, self.size(), self.dtype(), entries)
    }

    /// Copy into an n x 1 matrix.
    pub(crate) fn as_column(&self) -> SparseMatrix {
        let entries = self.iter().map(|(r, v)| ((r, 0), v)).collect();
        SparseMatrix::from_entries(self.size(), 1, self.dtype(), entries)
    }
}
