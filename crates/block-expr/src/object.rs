//! Logical vectors, matrices and scalars split into delayed blocks.

use std::ops::Range;

use sparse_kernels::{
    ApplyOp, BinaryOp, DType, Index, KernelError, MaskKind, Monoid, Scalar, Semiring,
    SparseMatrix, SparseScalar, SparseVector,
};

use crate::error::{BlockExprError, Result};
use crate::expr::{DeferredExpression, Operation};
use crate::graph::Delayed;
use crate::grid::BlockGrid;
use crate::indexer::LazyIndexer;
use crate::inner::Inner;
use crate::mask::Mask;
use crate::meta::Meta;
use crate::options::WriteOptions;
use crate::partition::BlockPartition;
use crate::updater::Updater;

/// A logical 0-, 1- or 2-dimensional sparse object stored as a grid of
/// delayed blocks.
///
/// Every block has the object's dtype, and the block boundaries partition
/// the global shape without gaps or overlaps. Cloning is cheap: blocks are
/// shared handles.
#[derive(Debug, Clone)]
pub struct PartitionedObject {
    meta: Meta,
    grid: BlockGrid<Inner>,
}

fn positions(range: Range<usize>) -> Vec<usize> {
    range.collect()
}

impl PartitionedObject {
    pub(crate) fn from_parts(meta: Meta, grid: BlockGrid<Inner>) -> Self {
        Self { meta, grid }
    }

    /// Split `vector` along `partition`.
    pub fn from_vector(vector: &SparseVector, partition: BlockPartition) -> Result<Self> {
        if partition.total_dim() != vector.size() {
            return Err(KernelError::DimensionMismatch {
                expected: vec![vector.size()],
                actual: vec![partition.total_dim()],
            }
            .into());
        }
        let mut blocks = Vec::with_capacity(partition.num_blocks());
        for b in 0..partition.num_blocks() {
            let block = vector.extract_positions(&positions(partition.block_range(b)))?;
            blocks.push(Delayed::from_value(format!("vector-{b}"), Inner::Vector(block)));
        }
        let meta = Meta::new(vec![vector.size()], vector.dtype(), Some(vector.nvals()));
        Ok(Self::from_parts(meta, BlockGrid::new(vec![partition], blocks)?))
    }

    /// Split `matrix` into the grid `rows` x `cols`.
    pub fn from_matrix(
        matrix: &SparseMatrix,
        rows: BlockPartition,
        cols: BlockPartition,
    ) -> Result<Self> {
        let actual = [rows.total_dim(), cols.total_dim()];
        if actual != matrix.shape() {
            return Err(KernelError::DimensionMismatch {
                expected: matrix.shape().to_vec(),
                actual: actual.to_vec(),
            }
            .into());
        }
        let mut blocks = Vec::with_capacity(rows.num_blocks() * cols.num_blocks());
        for i in 0..rows.num_blocks() {
            let row_pos = positions(rows.block_range(i));
            for j in 0..cols.num_blocks() {
                let block = matrix.extract_positions(&row_pos, &positions(cols.block_range(j)))?;
                blocks.push(Delayed::from_value(
                    format!("matrix-{i}-{j}"),
                    Inner::Matrix(block),
                ));
            }
        }
        let meta = Meta::new(matrix.shape().to_vec(), matrix.dtype(), Some(matrix.nvals()));
        Ok(Self::from_parts(meta, BlockGrid::new(vec![rows, cols], blocks)?))
    }

    pub fn from_scalar(scalar: SparseScalar) -> Self {
        let meta = Meta::new(Vec::new(), scalar.dtype(), Some(scalar.nvals()));
        let block = Delayed::from_value("scalar", Inner::Scalar(scalar));
        Self::from_parts(
            meta,
            BlockGrid::from_fn(Vec::new(), |_| block.clone()),
        )
    }

    /// An object with no stored values.
    pub(crate) fn empty(dtype: DType, partitions: &[BlockPartition]) -> Result<Self> {
        let shape: Vec<usize> = partitions.iter().map(BlockPartition::total_dim).collect();
        Inner::empty(dtype, &shape)?;
        let grid = BlockGrid::from_fn(partitions.to_vec(), |idx| {
            let block_shape: Vec<usize> = partitions
                .iter()
                .zip(idx)
                .map(|(p, &b)| p.block_size(b))
                .collect();
            let name = format!("empty-{idx:?}");
            Delayed::new(name, move || Inner::empty(dtype, &block_shape))
        });
        Ok(Self::from_parts(Meta::new(shape, dtype, Some(0)), grid))
    }

    pub fn new_vector(dtype: DType, partition: BlockPartition) -> Self {
        let grid = BlockGrid::from_fn(vec![partition.clone()], |idx| {
            let block = SparseVector::new(dtype, partition.block_size(idx[0]));
            Delayed::from_value(format!("empty-{}", idx[0]), Inner::Vector(block))
        });
        Self::from_parts(Meta::new(vec![partition.total_dim()], dtype, Some(0)), grid)
    }

    pub fn new_matrix(dtype: DType, rows: BlockPartition, cols: BlockPartition) -> Self {
        let shape = vec![rows.total_dim(), cols.total_dim()];
        let grid = BlockGrid::from_fn(vec![rows.clone(), cols.clone()], |idx| {
            let block = SparseMatrix::new(dtype, rows.block_size(idx[0]), cols.block_size(idx[1]));
            Delayed::from_value(
                format!("empty-{}-{}", idx[0], idx[1]),
                Inner::Matrix(block),
            )
        });
        Self::from_parts(Meta::new(shape, dtype, Some(0)), grid)
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn shape(&self) -> &[usize] {
        self.meta.shape()
    }

    pub fn ndim(&self) -> usize {
        self.meta.ndim()
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype()
    }

    pub fn partitions(&self) -> &[BlockPartition] {
        self.grid.partitions()
    }

    pub fn num_blocks(&self) -> Vec<usize> {
        self.grid.num_blocks()
    }

    pub fn grid(&self) -> &BlockGrid<Inner> {
        &self.grid
    }

    /// Whether every block has already been computed.
    pub fn is_evaluated(&self) -> bool {
        self.grid.is_evaluated()
    }

    /// Replace the storage after a write.
    pub(crate) fn set_storage(&mut self, meta: Meta, grid: BlockGrid<Inner>) {
        self.meta = meta;
        self.grid = grid;
    }

    /// The same values blocked along `partitions`.
    ///
    /// Each new block gathers the overlapping pieces of the old blocks.
    pub fn rechunk(&self, partitions: &[BlockPartition]) -> Result<Self> {
        if partitions.len() != self.ndim() {
            return Err(BlockExprError::RankMismatch {
                expected: self.ndim(),
                actual: partitions.len(),
            });
        }
        let new_shape: Vec<usize> = partitions.iter().map(BlockPartition::total_dim).collect();
        if new_shape != self.shape() {
            return Err(KernelError::DimensionMismatch {
                expected: self.shape().to_vec(),
                actual: new_shape,
            }
            .into());
        }
        if partitions == self.partitions() {
            return Ok(self.clone());
        }
        let to: Vec<usize> = partitions.iter().map(BlockPartition::num_blocks).collect();
        tracing::debug!(from = ?self.num_blocks(), ?to, "rechunking");

        let old = self.grid.clone();
        let dtype = self.dtype();
        let grid = BlockGrid::from_fn(partitions.to_vec(), |idx| {
            // Per axis: (old block, local range inside it).
            let pieces: Vec<Vec<(usize, Range<usize>)>> = idx
                .iter()
                .zip(partitions)
                .zip(old.partitions())
                .map(|((&b, new), old)| old.overlaps(new.block_range(b)))
                .collect();
            let block_shape: Vec<usize> = idx
                .iter()
                .zip(partitions)
                .map(|(&b, p)| p.block_size(b))
                .collect();
            // Old blocks in row-major order, with the local ranges to cut
            // from each; `layout` has one row of range sets per old row.
            let mut deps = Vec::new();
            let mut layout: Vec<Vec<Vec<Range<usize>>>> = Vec::new();
            match pieces.as_slice() {
                [axis0] => layout.push(
                    axis0
                        .iter()
                        .map(|(b, r)| {
                            deps.push(old.block(&[*b]).clone());
                            vec![r.clone()]
                        })
                        .collect(),
                ),
                [rows, cols] => {
                    for (i, rr) in rows {
                        let mut row = Vec::with_capacity(cols.len());
                        for (j, cr) in cols {
                            deps.push(old.block(&[*i, *j]).clone());
                            row.push(vec![rr.clone(), cr.clone()]);
                        }
                        layout.push(row);
                    }
                }
                _ => {}
            }
            Delayed::after(format!("rechunk-{idx:?}"), deps, move |blocks| {
                gather_pieces(blocks, &layout, dtype, &block_shape)
            })
        });
        Ok(Self::from_parts(self.meta.clone(), grid))
    }

    /// Gather every block into one backend value.
    pub fn compute(&self) -> Result<Inner> {
        tracing::debug!(
            shape = ?self.shape(),
            blocks = self.grid.blocks().len(),
            "computing partitioned object"
        );
        let blocks = self
            .grid
            .blocks()
            .iter()
            .map(Delayed::compute)
            .collect::<Result<Vec<_>>>()?;
        match self.ndim() {
            0 => blocks
                .into_iter()
                .next()
                .ok_or_else(|| BlockExprError::Usage("scalar object without a block".into())),
            1 => {
                let pieces = blocks
                    .iter()
                    .map(|b| b.as_vector().cloned())
                    .collect::<Result<Vec<_>>>()?;
                Ok(Inner::Vector(
                    SparseVector::concat(&pieces)?.dup(Some(self.dtype())),
                ))
            }
            _ => {
                let ncols = self.grid.num_blocks()[1];
                let mut rows = Vec::new();
                for chunk in blocks.chunks(ncols.max(1)) {
                    rows.push(
                        chunk
                            .iter()
                            .map(|b| b.as_matrix().cloned())
                            .collect::<Result<Vec<_>>>()?,
                    );
                }
                Ok(Inner::Matrix(
                    SparseMatrix::concat_grid(&rows)?.dup(Some(self.dtype())),
                ))
            }
        }
    }

    pub fn to_vector(&self) -> Result<SparseVector> {
        self.compute()?.as_vector().cloned()
    }

    pub fn to_matrix(&self) -> Result<SparseMatrix> {
        self.compute()?.as_matrix().cloned()
    }

    pub fn to_scalar(&self) -> Result<SparseScalar> {
        self.compute()?.as_scalar().copied()
    }

    /// Number of stored values (forces every block).
    pub fn nvals(&self) -> Result<usize> {
        let mut total = 0;
        for block in self.grid.blocks() {
            total += block.compute()?.nvals();
        }
        Ok(total)
    }

    /// Stored value of a scalar object.
    pub fn value(&self) -> Result<Option<Scalar>> {
        if !self.meta.is_scalar() {
            return Err(BlockExprError::Unsupported(format!(
                "value of a rank {} object",
                self.ndim()
            )));
        }
        Ok(self.to_scalar()?.value())
    }

    /// Copy with an optional dtype change.
    pub fn dup(&self, dtype: Option<DType>) -> Self {
        let meta = Meta::new(
            self.shape().to_vec(),
            dtype.unwrap_or(self.dtype()),
            self.meta.nvals(),
        );
        let grid = self.grid.map_blocks("dup", move |_, block| Ok(block.dup(dtype)));
        Self::from_parts(meta, grid)
    }

    /// Keep only the positions `mask` allows.
    pub(crate) fn masked(&self, mask: &Mask) -> Result<Self> {
        let mask_obj = mask.object().rechunk(self.partitions())?;
        let kind = mask.kind();
        let grid = BlockGrid::elementwise("mask", &[&self.grid, mask_obj.grid()], move |_, b| {
            b[0].masked(&b[1], kind)
        })?;
        let meta = Meta::new(self.shape().to_vec(), self.dtype(), None);
        Ok(Self::from_parts(meta, grid))
    }

    pub fn value_mask(&self) -> Mask {
        Mask::new(self.clone(), MaskKind::Value)
    }

    pub fn structure_mask(&self) -> Mask {
        Mask::new(self.clone(), MaskKind::Structure)
    }

    fn expression(&self, op: Operation) -> Result<DeferredExpression> {
        DeferredExpression::new(self.clone(), op)
    }

    /// Fold a vector into a scalar.
    pub fn reduce(&self, monoid: Monoid) -> Result<DeferredExpression> {
        self.expression(Operation::Reduce { monoid })
    }

    /// Fold a matrix into a scalar.
    pub fn reduce_scalar(&self, monoid: Monoid) -> Result<DeferredExpression> {
        self.expression(Operation::ReduceScalar { monoid })
    }

    pub fn reduce_rowwise(&self, monoid: Monoid) -> Result<DeferredExpression> {
        self.expression(Operation::ReduceRowwise { monoid })
    }

    pub fn reduce_columnwise(&self, monoid: Monoid) -> Result<DeferredExpression> {
        self.expression(Operation::ReduceColumnwise { monoid })
    }

    pub fn apply(&self, op: impl Into<ApplyOp>) -> Result<DeferredExpression> {
        self.expression(Operation::Apply { op: op.into() })
    }

    pub fn ewise_add(&self, other: &PartitionedObject, op: BinaryOp) -> Result<DeferredExpression> {
        self.expression(Operation::EwiseAdd {
            other: other.clone(),
            op,
        })
    }

    pub fn ewise_mult(
        &self,
        other: &PartitionedObject,
        op: BinaryOp,
    ) -> Result<DeferredExpression> {
        self.expression(Operation::EwiseMult {
            other: other.clone(),
            op,
        })
    }

    /// Matrix-vector product; `self` is the matrix.
    pub fn mxv(&self, other: &PartitionedObject, semiring: Semiring) -> Result<DeferredExpression> {
        self.expression(Operation::Mxv {
            other: other.clone(),
            semiring,
        })
    }

    /// Vector-matrix product; `self` is the vector.
    pub fn vxm(&self, other: &PartitionedObject, semiring: Semiring) -> Result<DeferredExpression> {
        self.expression(Operation::Vxm {
            other: other.clone(),
            semiring,
        })
    }

    pub fn mxm(&self, other: &PartitionedObject, semiring: Semiring) -> Result<DeferredExpression> {
        self.expression(Operation::Mxm {
            other: other.clone(),
            semiring,
        })
    }

    /// Start an indexing chain with one key per axis.
    pub fn index(&self, keys: Vec<Index>) -> Result<LazyIndexer> {
        LazyIndexer::new(self.clone(), keys, None)
    }

    /// A write destination qualified by `opts`.
    pub fn updater(&mut self, opts: WriteOptions) -> Result<Updater<'_>> {
        Updater::new(self, opts)
    }

    /// Unqualified write of `expr` into this object.
    pub fn update(&mut self, expr: &DeferredExpression) -> Result<()> {
        expr.write_into(self, None, None, false)
    }
}

/// Assemble one block from pieces of old blocks, cutting `layout[row][col]`
/// from the matching entry of `blocks`.
fn gather_pieces(
    blocks: Vec<Inner>,
    layout: &[Vec<Vec<Range<usize>>>],
    dtype: DType,
    block_shape: &[usize],
) -> Result<Inner> {
    if blocks.is_empty() {
        return Inner::empty(dtype, block_shape);
    }
    let mut blocks = blocks.into_iter();
    let mut next = || {
        blocks
            .next()
            .ok_or_else(|| BlockExprError::Usage("rechunk lost a source block".into()))
    };
    match block_shape.len() {
        1 => {
            let mut pieces = Vec::new();
            for ranges in layout.iter().flatten() {
                let v = next()?;
                pieces.push(v.as_vector()?.extract_positions(&positions(ranges[0].clone()))?);
            }
            Ok(Inner::Vector(SparseVector::concat(&pieces)?.dup(Some(dtype))))
        }
        _ => {
            let mut grid = Vec::with_capacity(layout.len());
            for row in layout {
                let mut pieces = Vec::with_capacity(row.len());
                for ranges in row {
                    let m = next()?;
                    pieces.push(m.as_matrix()?.extract_positions(
                        &positions(ranges[0].clone()),
                        &positions(ranges[1].clone()),
                    )?);
                }
                grid.push(pieces);
            }
            Ok(Inner::Matrix(SparseMatrix::concat_grid(&grid)?.dup(Some(dtype))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> SparseMatrix {
        SparseMatrix::from_values(
            vec![0, 1, 2, 3],
            vec![3, 0, 2, 1],
            vec![
                Scalar::Int64(1),
                Scalar::Int64(2),
                Scalar::Int64(3),
                Scalar::Int64(4),
            ],
            4,
            4,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_split_and_gather_matrix() {
        let m = sample_matrix();
        let obj = PartitionedObject::from_matrix(
            &m,
            BlockPartition::split(4, 3),
            BlockPartition::split(4, 2),
        )
        .unwrap();
        assert_eq!(obj.num_blocks(), vec![3, 2]);
        assert_eq!(obj.meta().nvals(), Some(4));
        assert_eq!(obj.to_matrix().unwrap(), m);
        assert_eq!(obj.nvals().unwrap(), 4);
    }

    #[test]
    fn test_from_vector_checks_size() {
        let v = SparseVector::new(DType::Fp64, 5);
        assert!(PartitionedObject::from_vector(&v, BlockPartition::trivial(4)).is_err());
    }

    #[test]
    fn test_rechunk_preserves_values() {
        let m = sample_matrix();
        let obj = PartitionedObject::from_matrix(
            &m,
            BlockPartition::new(vec![1, 3]),
            BlockPartition::new(vec![3, 1]),
        )
        .unwrap();
        let re = obj
            .rechunk(&[BlockPartition::uniform(2, 2), BlockPartition::new(vec![1, 1, 2])])
            .unwrap();
        assert!(!re.is_evaluated());
        assert_eq!(re.num_blocks(), vec![2, 3]);
        assert_eq!(re.to_matrix().unwrap(), m);
        assert_eq!(re.grid().block(&[1, 2]).compute().unwrap().shape(), vec![2, 2]);
    }

    #[test]
    fn test_rechunk_vector() {
        let v = SparseVector::from_values(
            vec![0, 4, 5],
            vec![Scalar::Fp64(1.0), Scalar::Fp64(2.0), Scalar::Fp64(3.0)],
            6,
            None,
        )
        .unwrap();
        let obj = PartitionedObject::from_vector(&v, BlockPartition::split(6, 4)).unwrap();
        let re = obj.rechunk(&[BlockPartition::new(vec![5, 1])]).unwrap();
        assert_eq!(re.to_vector().unwrap(), v);
    }

    #[test]
    fn test_empty_objects() {
        let v = PartitionedObject::new_vector(DType::Int64, BlockPartition::split(5, 2));
        assert_eq!(v.shape(), &[5]);
        assert_eq!(v.nvals().unwrap(), 0);
        let m = PartitionedObject::new_matrix(
            DType::Bool,
            BlockPartition::trivial(2),
            BlockPartition::split(3, 3),
        );
        assert_eq!(m.to_matrix().unwrap().shape(), [2, 3]);
        assert!(matches!(m.value(), Err(BlockExprError::Unsupported(_))));
    }

    #[test]
    fn test_scalar_object() {
        let s = PartitionedObject::from_scalar(SparseScalar::from_value(Scalar::Int64(3)));
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.value().unwrap(), Some(Scalar::Int64(3)));
        assert_eq!(s.dup(Some(DType::Fp64)).value().unwrap(), Some(Scalar::Fp64(3.0)));
    }
}
