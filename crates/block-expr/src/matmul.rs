//! Block-partitioned vector and matrix products.

use sparse_kernels::{DType, Semiring, SparseScalar};

use crate::error::{BlockExprError, Result};
use crate::grid::BlockGrid;
use crate::inner::Inner;
use crate::object::PartitionedObject;
use crate::partition::BlockPartition;
use crate::reduction::fold_union;
use crate::shape_adapter::{as_one_col_matrix, as_one_row_matrix, as_vector};

/// Product of one (row block, contracted block, column block) triple.
///
/// Slab blocks only exist between the block-local multiply and the combine
/// over the contracted axis.
#[derive(Debug, Clone)]
struct SlabBlock(sparse_kernels::SparseMatrix);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Bring an operand to matrix form; the flag tells whether it was lifted.
///
/// A left vector becomes a single row and a right vector a single column,
/// over the same storage.
fn lift(obj: &PartitionedObject, side: Side) -> Result<(BlockGrid<Inner>, bool)> {
    match (obj.ndim(), side) {
        (2, _) => Ok((obj.grid().clone(), false)),
        (1, Side::Left) => {
            let parts = vec![BlockPartition::trivial(1), obj.partitions()[0].clone()];
            let grid = obj.grid().map_blocks_reshaped(parts, "lift-row", |_, block| {
                Ok(Inner::Matrix(as_one_row_matrix(block.as_vector()?)?))
            })?;
            Ok((grid, true))
        }
        (1, Side::Right) => {
            let parts = vec![obj.partitions()[0].clone(), BlockPartition::trivial(1)];
            let grid = obj.grid().map_blocks_reshaped(parts, "lift-col", |_, block| {
                Ok(Inner::Matrix(as_one_col_matrix(block.as_vector()?)?))
            })?;
            Ok((grid, true))
        }
        (ndim, _) => Err(BlockExprError::Unsupported(format!(
            "multiply with a rank {ndim} operand"
        ))),
    }
}

/// `lhs @ rhs` over `semiring`, for any mix of vector and matrix operands.
///
/// Every block pair along the contracted axis is multiplied locally, the
/// products for one output block are folded with the semiring's monoid, and
/// the axes added for vector operands are dropped again. No operand is ever
/// transposed or redistributed.
///
/// # Errors
/// - [`BlockExprError::Unsupported`] if an operand is not of rank 1 or 2.
/// - [`BlockExprError::IncompatiblePartitions`] if the contracted axis is
///   partitioned differently on the two sides.
pub(crate) fn multiply(
    lhs: &PartitionedObject,
    rhs: &PartitionedObject,
    semiring: Semiring,
    dtype: DType,
    split_every: usize,
) -> Result<BlockGrid<Inner>> {
    let (a, left_lifted) = lift(lhs, Side::Left)?;
    let (b, right_lifted) = lift(rhs, Side::Right)?;

    if a.partitions()[1] != b.partitions()[0] {
        return Err(BlockExprError::IncompatiblePartitions(format!(
            "contracted axis: {:?} vs {:?}",
            a.partitions()[1],
            b.partitions()[0]
        )));
    }
    tracing::debug!(
        lhs = ?a.num_blocks(),
        rhs = ?b.num_blocks(),
        %semiring,
        "building blocked multiply"
    );

    let slabs = BlockGrid::blockwise(
        "slab",
        &['i', 'k', 'j'],
        &[(&a, &['i', 'k']), (&b, &['k', 'j'])],
        &[('k', 1)],
        move |_, blocks| {
            let product = blocks[0]
                .as_matrix()?
                .mxm(blocks[1].as_matrix()?, semiring, Some(dtype))?;
            Ok(SlabBlock(product))
        },
    )?;

    let monoid = semiring.monoid();
    let product = slabs.reduce_blocks(
        "slab-combine",
        &[1],
        |_, slab: SlabBlock| Ok(Inner::Matrix(slab.0)),
        move |partials| fold_union(partials, monoid, dtype),
        split_every,
        false,
    )?;

    let [rows, cols] = [product.partitions()[0].clone(), product.partitions()[1].clone()];
    match (left_lifted, right_lifted) {
        (false, false) => Ok(product),
        (true, false) => product.map_blocks_reshaped(vec![cols], "drop-row", |_, block| {
            Ok(Inner::Vector(as_vector(block.as_matrix()?)?))
        }),
        (false, true) => product.map_blocks_reshaped(vec![rows], "drop-col", |_, block| {
            Ok(Inner::Vector(as_vector(block.as_matrix()?)?))
        }),
        (true, true) => product.map_blocks_reshaped(Vec::new(), "drop-both", move |_, block| {
            let value = block.as_matrix()?.get(0, 0);
            Ok(Inner::Scalar(match value {
                Some(v) => SparseScalar::from_value(v.cast(dtype)),
                None => SparseScalar::new(dtype),
            }))
        }),
    }
}
