//! Deferred operations bound to a partitioned parent.
//!
//! A [`DeferredExpression`] records what to compute and the metadata of the
//! result. Nothing runs until it is materialised with
//! [`DeferredExpression::new_object`] or written into existing storage with
//! [`DeferredExpression::write_into`]; even then only the task graph is
//! built, and blocks are computed when the result is forced.

use std::fmt;
use std::str::FromStr;

use sparse_kernels::{ApplyOp, BinaryOp, DType, MaskKind, Monoid, Scalar, Semiring};

use crate::error::{BlockExprError, Result};
use crate::grid::BlockGrid;
use crate::inner::Inner;
use crate::mask::Mask;
use crate::matmul::multiply;
use crate::meta::Meta;
use crate::object::PartitionedObject;
use crate::options::ReduceOptions;
use crate::partition::BlockPartition;
use crate::reduction::{accumulate_scalar, reduce_along_axis, reduce_to_scalar, Along};

/// An operation together with its typed arguments.
#[derive(Debug, Clone)]
pub enum Operation {
    Reduce { monoid: Monoid },
    ReduceScalar { monoid: Monoid },
    ReduceRowwise { monoid: Monoid },
    ReduceColumnwise { monoid: Monoid },
    Apply { op: ApplyOp },
    EwiseAdd { other: PartitionedObject, op: BinaryOp },
    EwiseMult { other: PartitionedObject, op: BinaryOp },
    Mxv { other: PartitionedObject, semiring: Semiring },
    Vxm { other: PartitionedObject, semiring: Semiring },
    Mxm { other: PartitionedObject, semiring: Semiring },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Reduce { .. } => OperationKind::Reduce,
            Operation::ReduceScalar { .. } => OperationKind::ReduceScalar,
            Operation::ReduceRowwise { .. } => OperationKind::ReduceRowwise,
            Operation::ReduceColumnwise { .. } => OperationKind::ReduceColumnwise,
            Operation::Apply { .. } => OperationKind::Apply,
            Operation::EwiseAdd { .. } => OperationKind::EwiseAdd,
            Operation::EwiseMult { .. } => OperationKind::EwiseMult,
            Operation::Mxv { .. } => OperationKind::Mxv,
            Operation::Vxm { .. } => OperationKind::Vxm,
            Operation::Mxm { .. } => OperationKind::Mxm,
        }
    }
}

/// Operation names without arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Reduce,
    ReduceScalar,
    ReduceRowwise,
    ReduceColumnwise,
    Apply,
    EwiseAdd,
    EwiseMult,
    Mxv,
    Vxm,
    Mxm,
}

impl OperationKind {
    pub const ALL: [OperationKind; 10] = [
        OperationKind::Reduce,
        OperationKind::ReduceScalar,
        OperationKind::ReduceRowwise,
        OperationKind::ReduceColumnwise,
        OperationKind::Apply,
        OperationKind::EwiseAdd,
        OperationKind::EwiseMult,
        OperationKind::Mxv,
        OperationKind::Vxm,
        OperationKind::Mxm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Reduce => "reduce",
            OperationKind::ReduceScalar => "reduce_scalar",
            OperationKind::ReduceRowwise => "reduce_rowwise",
            OperationKind::ReduceColumnwise => "reduce_columnwise",
            OperationKind::Apply => "apply",
            OperationKind::EwiseAdd => "ewise_add",
            OperationKind::EwiseMult => "ewise_mult",
            OperationKind::Mxv => "mxv",
            OperationKind::Vxm => "vxm",
            OperationKind::Mxm => "mxm",
        }
    }

    pub fn is_reduction(self) -> bool {
        matches!(
            self,
            OperationKind::Reduce
                | OperationKind::ReduceScalar
                | OperationKind::ReduceRowwise
                | OperationKind::ReduceColumnwise
        )
    }

    pub fn is_elementwise(self) -> bool {
        matches!(
            self,
            OperationKind::Apply | OperationKind::EwiseAdd | OperationKind::EwiseMult
        )
    }

    pub fn is_multiply(self) -> bool {
        matches!(
            self,
            OperationKind::Mxv | OperationKind::Vxm | OperationKind::Mxm
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = BlockExprError;

    fn from_str(s: &str) -> Result<Self> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| BlockExprError::Unsupported(format!("unknown operation '{s}'")))
    }
}

/// Per-block body of the elementwise kinds.
#[derive(Debug, Clone, Copy)]
enum BlockOp {
    Apply(ApplyOp),
    EwiseAdd(BinaryOp),
    EwiseMult(BinaryOp),
}

impl BlockOp {
    fn run(self, operands: &[Inner]) -> Result<Inner> {
        match (self, operands) {
            (BlockOp::Apply(op), [x]) => x.apply(&op),
            (BlockOp::EwiseAdd(op), [a, b]) => a.ewise_add(b, op),
            (BlockOp::EwiseMult(op), [a, b]) => a.ewise_mult(b, op),
            _ => Err(BlockExprError::Usage(format!(
                "{self:?} got {} operands",
                operands.len()
            ))),
        }
    }
}

/// Target blocks after a qualified write of `source` under `mask`.
fn qualified_grid(
    target: &BlockGrid<Inner>,
    source: &BlockGrid<Inner>,
    mask: Option<(&BlockGrid<Inner>, MaskKind)>,
    accum: Option<BinaryOp>,
    replace: bool,
) -> Result<BlockGrid<Inner>> {
    let mut inputs = vec![target, source];
    let kind = mask.map(|(grid, kind)| {
        inputs.push(grid);
        kind
    });
    BlockGrid::elementwise("qualified-write", &inputs, move |_, blocks| {
        let mut blocks = blocks.into_iter();
        let (Some(mut out), Some(src)) = (blocks.next(), blocks.next()) else {
            return Err(BlockExprError::Usage("qualified write without a source".into()));
        };
        let mask = blocks.next();
        out.assign_qualified(&src, mask.as_ref().zip(kind), accum, replace)?;
        Ok(out)
    })
}

/// A not yet computed operation on a partitioned parent.
///
/// Building one only derives its [`Meta`]; shape, dtype and rank errors are
/// reported here, before any block is touched.
#[derive(Debug, Clone)]
pub struct DeferredExpression {
    parent: PartitionedObject,
    op: Operation,
    meta: Meta,
    reduce_options: ReduceOptions,
}

impl DeferredExpression {
    pub(crate) fn new(parent: PartitionedObject, op: Operation) -> Result<Self> {
        let pm = parent.meta();
        let meta = match &op {
            Operation::Reduce { monoid } => pm.reduce(*monoid)?,
            Operation::ReduceScalar { monoid } => pm.reduce_scalar(*monoid)?,
            Operation::ReduceRowwise { monoid } => pm.reduce_rowwise(*monoid)?,
            Operation::ReduceColumnwise { monoid } => pm.reduce_columnwise(*monoid)?,
            Operation::Apply { op } => pm.apply(op)?,
            Operation::EwiseAdd { other, op } | Operation::EwiseMult { other, op } => {
                pm.ewise(other.meta(), *op)?
            }
            Operation::Mxv { other, semiring } => pm.mxv(other.meta(), *semiring)?,
            Operation::Vxm { other, semiring } => pm.vxm(other.meta(), *semiring)?,
            Operation::Mxm { other, semiring } => pm.mxm(other.meta(), *semiring)?,
        };
        Ok(Self {
            parent,
            op,
            meta,
            reduce_options: ReduceOptions::default(),
        })
    }

    /// Shape and dtype of the result, known without computing anything.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn kind(&self) -> OperationKind {
        self.op.kind()
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn parent(&self) -> &PartitionedObject {
        &self.parent
    }

    /// Fan-in for the combine trees of reductions and products.
    pub fn with_reduce_options(mut self, options: ReduceOptions) -> Self {
        self.reduce_options = options;
        self
    }

    /// Elementwise result blocked along `partitions`, cast to `dtype` and
    /// filtered by `mask`, all inside one task per block.
    fn elementwise_grid(
        &self,
        partitions: &[BlockPartition],
        dtype: DType,
        mask: Option<&Mask>,
    ) -> Result<BlockGrid<Inner>> {
        let parent = self.parent.rechunk(partitions)?;
        let (block_op, other) = match &self.op {
            Operation::Apply { op } => (BlockOp::Apply(*op), None),
            Operation::EwiseAdd { other, op } => {
                (BlockOp::EwiseAdd(*op), Some(other.rechunk(partitions)?))
            }
            Operation::EwiseMult { other, op } => {
                (BlockOp::EwiseMult(*op), Some(other.rechunk(partitions)?))
            }
            op => {
                return Err(BlockExprError::Usage(format!(
                    "{} is not an elementwise operation",
                    op.kind()
                )))
            }
        };
        let mask_obj = mask
            .map(|m| m.object().rechunk(partitions))
            .transpose()?;
        let kind = mask.map(Mask::kind);

        let mut inputs = vec![parent.grid()];
        if let Some(other) = &other {
            inputs.push(other.grid());
        }
        let operands = inputs.len();
        if let Some(mask_obj) = &mask_obj {
            inputs.push(mask_obj.grid());
        }
        BlockGrid::elementwise(self.kind().name(), &inputs, move |_, blocks| {
            let out = block_op.run(&blocks[..operands])?.dup(Some(dtype));
            match kind {
                Some(kind) => out.masked(&blocks[operands], kind),
                None => Ok(out),
            }
        })
    }

    /// Materialise into a fresh object, leaving every existing object alone.
    ///
    /// # Errors
    /// Metadata errors (for example a mask of the wrong shape) are returned
    /// right away; block errors surface when the result is forced.
    pub fn new_object(
        &self,
        dtype: Option<DType>,
        mask: Option<&Mask>,
    ) -> Result<PartitionedObject> {
        let meta = self.meta.new_object(dtype, mask.map(Mask::meta))?;
        let dtype = meta.dtype();
        tracing::debug!(
            op = %self.kind(),
            shape = ?meta.shape(),
            %dtype,
            masked = mask.is_some(),
            "materialising expression"
        );
        let split_every = self.reduce_options.split_every()?;
        let grid = match &self.op {
            Operation::Reduce { monoid } | Operation::ReduceScalar { monoid } => {
                reduce_to_scalar(&self.parent, *monoid, dtype, split_every)?
            }
            Operation::ReduceRowwise { monoid } => {
                reduce_along_axis(&self.parent, Along::Rows, *monoid, dtype, split_every)?
            }
            Operation::ReduceColumnwise { monoid } => {
                reduce_along_axis(&self.parent, Along::Columns, *monoid, dtype, split_every)?
            }
            Operation::Apply { .. } | Operation::EwiseAdd { .. } | Operation::EwiseMult { .. } => {
                let grid = self.elementwise_grid(self.parent.partitions(), dtype, mask)?;
                return Ok(PartitionedObject::from_parts(meta, grid));
            }
            Operation::Mxv { other, semiring }
            | Operation::Vxm { other, semiring }
            | Operation::Mxm { other, semiring } => {
                multiply(&self.parent, other, *semiring, dtype, split_every)?
            }
        };
        let out = PartitionedObject::from_parts(meta, grid);
        match mask {
            None => Ok(out),
            Some(mask) if self.kind().is_multiply() => {
                // The product kernel never sees the mask.
                let mut target = PartitionedObject::empty(dtype, out.partitions())?;
                out.apply(ApplyOp::identity())?
                    .write_into(&mut target, Some(mask), None, false)?;
                Ok(target)
            }
            Some(mask) => out.masked(mask),
        }
    }

    /// Write the result into `target` under the given qualifiers.
    ///
    /// The target keeps its shape, dtype and partitions; on return it holds
    /// the new (still lazy) value.
    ///
    /// # Errors
    /// - [`BlockExprError::Usage`] if `replace` is set without a mask.
    /// - [`BlockExprError::Backend`] if shapes do not line up.
    pub fn write_into(
        &self,
        target: &mut PartitionedObject,
        mask: Option<&Mask>,
        accum: Option<BinaryOp>,
        replace: bool,
    ) -> Result<()> {
        let updated = target
            .meta()
            .update(&self.meta, mask.map(Mask::meta), accum, Some(replace))?;
        tracing::debug!(
            op = %self.kind(),
            shape = ?target.shape(),
            masked = mask.is_some(),
            accum = ?accum,
            replace,
            "writing expression"
        );
        let dtype = target.dtype();
        let split_every = self.reduce_options.split_every()?;
        let grid = match &self.op {
            Operation::Reduce { monoid } | Operation::ReduceScalar { monoid } => {
                let reduced =
                    reduce_to_scalar(&self.parent, *monoid, self.meta.dtype(), split_every)?
                        .map_blocks("cast", move |_, block| Ok(block.dup(Some(dtype))));
                match accum {
                    Some(op) => accumulate_scalar(target.grid(), &reduced, op)?,
                    None => reduced,
                }
            }
            Operation::ReduceRowwise { monoid } | Operation::ReduceColumnwise { monoid } => {
                let along = match self.kind() {
                    OperationKind::ReduceRowwise => Along::Rows,
                    _ => Along::Columns,
                };
                let reduced_dtype = self.meta.dtype();
                let grid =
                    reduce_along_axis(&self.parent, along, *monoid, reduced_dtype, split_every)?;
                let reduced = PartitionedObject::from_parts(self.meta.clone(), grid);
                Self::qualified_write(target, &reduced, mask, accum, replace)?
            }
            Operation::Apply { .. } | Operation::EwiseAdd { .. } | Operation::EwiseMult { .. } => {
                if mask.is_none() && accum.is_none() {
                    self.elementwise_grid(target.partitions(), dtype, None)?
                } else {
                    let grid =
                        self.elementwise_grid(target.partitions(), self.meta.dtype(), None)?;
                    let source = PartitionedObject::from_parts(self.meta.clone(), grid);
                    Self::qualified_write(target, &source, mask, accum, replace)?
                }
            }
            Operation::Mxv { .. } | Operation::Vxm { .. } | Operation::Mxm { .. } => {
                let product = self
                    .new_object(None, None)?
                    .apply(ApplyOp::identity())?
                    .with_reduce_options(self.reduce_options);
                return product.write_into(target, mask, accum, replace);
            }
        };
        target.set_storage(updated, grid);
        Ok(())
    }

    /// Overwrite when unqualified, otherwise merge block by block.
    fn qualified_write(
        target: &PartitionedObject,
        source: &PartitionedObject,
        mask: Option<&Mask>,
        accum: Option<BinaryOp>,
        replace: bool,
    ) -> Result<BlockGrid<Inner>> {
        let source = source.rechunk(target.partitions())?;
        if mask.is_none() && accum.is_none() {
            return Ok(source.dup(Some(target.dtype())).grid().clone());
        }
        let mask_obj = mask
            .map(|m| m.object().rechunk(target.partitions()))
            .transpose()?;
        let mask_grid = mask_obj.as_ref().map(PartitionedObject::grid).zip(mask.map(Mask::kind));
        qualified_grid(target.grid(), source.grid(), mask_grid, accum, replace)
    }

    /// Force the result of a scalar-valued expression.
    pub fn value(&self) -> Result<Option<Scalar>> {
        if !self.meta.is_scalar() {
            return Err(BlockExprError::Unsupported(format!(
                "value of a rank {} result",
                self.meta.ndim()
            )));
        }
        self.new_object(None, None)?.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparse_kernels::{SparseMatrix, SparseVector, UnaryOp};

    fn vector(values: &[(usize, i64)], size: usize, parts: usize) -> PartitionedObject {
        let v = SparseVector::from_values(
            values.iter().map(|&(i, _)| i).collect(),
            values.iter().map(|&(_, x)| Scalar::Int64(x)).collect(),
            size,
            Some(DType::Int64),
        )
        .unwrap();
        PartitionedObject::from_vector(&v, BlockPartition::split(size, parts)).unwrap()
    }

    #[test]
    fn test_operation_kind_names() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.name().parse::<OperationKind>().unwrap(), kind);
        }
        assert!(matches!(
            "kronecker".parse::<OperationKind>(),
            Err(BlockExprError::Unsupported(_))
        ));
        assert!(OperationKind::Mxv.is_multiply());
        assert!(OperationKind::ReduceRowwise.is_reduction());
        assert!(!OperationKind::Apply.is_reduction());
    }

    #[test]
    fn test_builders_fail_fast() {
        let u = vector(&[(0, 1)], 3, 2);
        let w = vector(&[(0, 1)], 4, 2);
        assert!(u.ewise_add(&w, BinaryOp::Plus).is_err());
        assert!(matches!(
            u.reduce_rowwise(Monoid::PLUS),
            Err(BlockExprError::Unsupported(_))
        ));
    }

    #[test]
    fn test_elementwise_with_different_partitions() {
        let u = vector(&[(0, 1), (3, 2)], 5, 2);
        let w = vector(&[(3, 5), (4, 1)], 5, 3);
        let expr = u.ewise_mult(&w, BinaryOp::Times).unwrap();
        let out = expr.new_object(None, None).unwrap();
        assert_eq!(out.partitions(), u.partitions());
        let v = out.to_vector().unwrap();
        assert_eq!(v.nvals(), 1);
        assert_eq!(v.get(3), Some(Scalar::Int64(10)));
    }

    #[test]
    fn test_new_object_with_dtype_and_mask() {
        let u = vector(&[(0, 1), (1, -2), (2, 3)], 3, 2);
        let m = vector(&[(1, 1), (2, 0)], 3, 1);
        let out = u
            .apply(UnaryOp::AInv)
            .unwrap()
            .new_object(Some(DType::Fp64), Some(&m.value_mask()))
            .unwrap();
        assert_eq!(out.dtype(), DType::Fp64);
        let v = out.to_vector().unwrap();
        assert_eq!(v.indices(), &[1]);
        assert_eq!(v.get(1), Some(Scalar::Fp64(2.0)));
    }

    #[test]
    fn test_reduce_value() {
        let u = vector(&[(0, 4), (2, 5), (5, 1)], 6, 3);
        let expr = u.reduce(Monoid::MAX).unwrap();
        assert_eq!(expr.value().unwrap(), Some(Scalar::Int64(5)));
        assert!(matches!(
            u.apply(UnaryOp::Abs).unwrap().value(),
            Err(BlockExprError::Unsupported(_))
        ));
    }

    #[test]
    fn test_scalar_write_with_accum() {
        let u = vector(&[(0, 4), (2, 5)], 4, 2);
        let mut s = PartitionedObject::from_scalar(sparse_kernels::SparseScalar::from_value(
            Scalar::Int64(10),
        ));
        u.reduce(Monoid::PLUS)
            .unwrap()
            .write_into(&mut s, None, Some(BinaryOp::Plus), false)
            .unwrap();
        assert_eq!(s.value().unwrap(), Some(Scalar::Int64(19)));
    }

    #[test]
    fn test_masked_multiply_materialisation() {
        let m = SparseMatrix::from_values(
            vec![0, 1, 1],
            vec![0, 0, 1],
            vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)],
            2,
            2,
            None,
        )
        .unwrap();
        let a = PartitionedObject::from_matrix(
            &m,
            BlockPartition::trivial(2),
            BlockPartition::split(2, 2),
        )
        .unwrap();
        let x = vector(&[(0, 1), (1, 1)], 2, 2);
        let mask = vector(&[(1, 1)], 2, 1).structure_mask();
        let out = a
            .mxv(&x, Semiring::plus_times())
            .unwrap()
            .new_object(None, Some(&mask))
            .unwrap();
        let v = out.to_vector().unwrap();
        assert_eq!(v.nvals(), 1);
        assert_eq!(v.get(1), Some(Scalar::Int64(5)));
    }

    #[test]
    fn test_write_into_rejects_replace_without_mask() {
        let u = vector(&[(0, 1)], 3, 1);
        let mut w = vector(&[], 3, 1);
        let expr = u.apply(UnaryOp::Identity).unwrap();
        assert!(matches!(
            expr.write_into(&mut w, None, None, true),
            Err(BlockExprError::Usage(_))
        ));
    }
}
