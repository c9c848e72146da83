//! Map/combine reductions over block grids.
//!
//! Every block is reduced on its own (map phase), then the partials that
//! belong to the same output block are folded with the monoid in a tree
//! (combine phase, see [`BlockGrid::reduce_blocks`]).

use sparse_kernels::{BinaryOp, DType, Monoid, SparseScalar, SparseVector};

use crate::error::{BlockExprError, Result};
use crate::grid::BlockGrid;
use crate::inner::Inner;
use crate::object::PartitionedObject;

/// Axis kept by an axis reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Along {
    /// One value per row.
    Rows,
    /// One value per column.
    Columns,
}

/// Reduce every stored value of a vector or matrix to one scalar block.
pub(crate) fn reduce_to_scalar(
    obj: &PartitionedObject,
    monoid: Monoid,
    dtype: DType,
    split_every: usize,
) -> Result<BlockGrid<Inner>> {
    let axes: Vec<usize> = (0..obj.ndim()).collect();
    obj.grid().reduce_blocks(
        "reduce",
        &axes,
        move |_, block| {
            let partial = match &block {
                Inner::Vector(v) => v.reduce(monoid)?,
                Inner::Matrix(m) => m.reduce_scalar(monoid)?,
                Inner::Scalar(_) => {
                    return Err(BlockExprError::Unsupported(
                        "scalar blocks cannot be reduced".into(),
                    ))
                }
            };
            Ok(Inner::Scalar(partial.dup(Some(dtype))))
        },
        move |partials| combine_scalars(&partials, monoid, dtype),
        split_every,
        false,
    )
}

/// Pack the non-empty partials into a short vector and reduce it once more.
fn combine_scalars(partials: &[Inner], monoid: Monoid, dtype: DType) -> Result<Inner> {
    let mut values = Vec::with_capacity(partials.len());
    for partial in partials {
        if let Some(v) = partial.as_scalar()?.value() {
            values.push(v);
        }
    }
    let n = values.len();
    let packed = SparseVector::from_values((0..n).collect(), values, n, Some(dtype))?;
    Ok(Inner::Scalar(packed.reduce(monoid)?.dup(Some(dtype))))
}

/// Row-wise or column-wise reduction of a matrix.
pub(crate) fn reduce_along_axis(
    obj: &PartitionedObject,
    along: Along,
    monoid: Monoid,
    dtype: DType,
    split_every: usize,
) -> Result<BlockGrid<Inner>> {
    let (name, axis) = match along {
        Along::Rows => ("reduce_rowwise", 1),
        Along::Columns => ("reduce_columnwise", 0),
    };
    obj.grid().reduce_blocks(
        name,
        &[axis],
        move |_, block| {
            let m = block.as_matrix()?;
            let partial = match along {
                Along::Rows => m.reduce_rowwise(monoid)?,
                Along::Columns => m.reduce_columnwise(monoid)?,
            };
            Ok(Inner::Vector(partial.dup(Some(dtype))))
        },
        move |partials| fold_union(partials, monoid, dtype),
        split_every,
        false,
    )
}

/// Elementwise union of partials; overlapping positions are combined with
/// the monoid and positions present in one partial only are kept as is.
pub(crate) fn fold_union(partials: Vec<Inner>, monoid: Monoid, dtype: DType) -> Result<Inner> {
    let mut iter = partials.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| BlockExprError::Usage("nothing to combine".into()))?;
    let folded = iter.try_fold(first, |acc, next| acc.ewise_add(&next, monoid.op()))?;
    Ok(folded.dup(Some(dtype)))
}

/// Combine a reduced scalar with the prior target value.
///
/// An empty value on either side acts as the identity of `accum`.
pub(crate) fn accumulate_scalar(
    target: &BlockGrid<Inner>,
    reduced: &BlockGrid<Inner>,
    accum: BinaryOp,
) -> Result<BlockGrid<Inner>> {
    BlockGrid::elementwise("accumulate", &[target, reduced], move |_, blocks| {
        let prior: &SparseScalar = blocks[0].as_scalar()?;
        let value = blocks[1].as_scalar()?;
        Ok(Inner::Scalar(prior.accumulate(value, accum)?))
    })
}
