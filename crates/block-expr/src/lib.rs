//! Deferred expressions over block-partitioned sparse vectors and matrices.
//!
//! A [`PartitionedObject`] is a logical vector, matrix or scalar split into
//! blocks, each block a lazily computed [`sparse_kernels`] value. Operations
//! on objects build [`DeferredExpression`]s whose result shape and dtype are
//! known immediately; materialising or writing an expression only extends
//! the task graph, and blocks are computed when a result is forced.
//!
//! # Core Types
//!
//! - [`BlockPartition`]: Block sizes along one axis
//! - [`Delayed`] / [`BlockGrid`]: Memoised tasks and grids of them
//! - [`PartitionedObject`]: A blocked vector, matrix or scalar
//! - [`DeferredExpression`]: An unevaluated reduce, elementwise or multiply
//! - [`Updater`]: A target with mask, accumulator and replace flag
//! - [`LazyIndexer`]: Chained indexing resolved to a read or a write
//!
//! # Example
//!
//! ```
//! use block_expr::{BlockPartition, PartitionedObject, Result};
//! use sparse_kernels::{Monoid, Scalar, Semiring, SparseMatrix, SparseVector};
//!
//! fn main() -> Result<()> {
//!     let a = SparseMatrix::from_values(
//!         vec![0, 1, 2],
//!         vec![0, 2, 1],
//!         vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)],
//!         3,
//!         3,
//!         None,
//!     )?;
//!     let v = SparseVector::from_values(
//!         vec![0, 2],
//!         vec![Scalar::Int64(5), Scalar::Int64(1)],
//!         3,
//!         None,
//!     )?;
//!
//!     let halves = BlockPartition::split(3, 2);
//!     let a = PartitionedObject::from_matrix(&a, halves.clone(), halves.clone())?;
//!     let v = PartitionedObject::from_vector(&v, halves)?;
//!
//!     let u = a.mxv(&v, Semiring::plus_times())?.new_object(None, None)?;
//!     assert_eq!(u.to_vector()?.get(1), Some(Scalar::Int64(2)));
//!
//!     let total = a.reduce_scalar(Monoid::PLUS)?.value()?;
//!     assert_eq!(total, Some(Scalar::Int64(6)));
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod expr;
mod graph;
mod grid;
mod indexer;
mod inner;
mod mask;
mod matmul;
mod meta;
mod object;
mod options;
mod partition;
mod reduction;
mod shape_adapter;
mod updater;

pub use config::{GlobalSplitEvery, InvalidSplitEveryError, DEFAULT_SPLIT_EVERY};
pub use error::{BlockExprError, Result};
pub use expr::{DeferredExpression, Operation, OperationKind};
pub use graph::Delayed;
pub use grid::BlockGrid;
pub use indexer::LazyIndexer;
pub use inner::Inner;
pub use mask::Mask;
pub use meta::Meta;
pub use object::PartitionedObject;
pub use options::{ReduceOptions, WriteOptions};
pub use partition::{block_linear_index, block_multi_index, BlockIndex, BlockPartition};
pub use shape_adapter::{as_one_col_matrix, as_one_row_matrix, as_vector};
pub use updater::Updater;

pub use sparse_kernels;
