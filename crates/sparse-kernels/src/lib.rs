//! Block-local sparse linear algebra kernels.
//!
//! This crate provides the in-memory sparse containers that make up a single
//! block of a partitioned object, together with the operators that act on
//! them. Every operation here is eager and single-threaded; deferral and
//! partitioning live one level up.
//!
//! # Core Types
//!
//! - [`SparseScalar`]: A 0-dimensional value that may be empty
//! - [`SparseVector`]: Sorted coordinate vector with shared storage
//! - [`SparseMatrix`]: CSR or CSC matrix with shared storage
//! - [`BinaryOp`], [`Monoid`], [`Semiring`], [`ApplyOp`]: Operators
//! - [`MaskKind`]: Value / structure masks and their complements
//!
//! # Example
//!
//! ```
//! use sparse_kernels::{Scalar, Semiring, SparseMatrix};
//!
//! let a = SparseMatrix::from_values(
//!     vec![0, 1],
//!     vec![1, 0],
//!     vec![Scalar::Fp64(2.0), Scalar::Fp64(3.0)],
//!     2,
//!     2,
//!     None,
//! )
//! .unwrap();
//! let c = a.mxm(&a, Semiring::plus_times(), None).unwrap();
//! assert_eq!(c.get(0, 0), Some(Scalar::Fp64(6.0)));
//! ```

mod dtype;
mod error;
mod index;
mod mask;
mod matrix;
mod merge;
mod ops;
mod scalar;
mod vector;

pub use dtype::{DType, Scalar};
pub use error::{KernelError, Result};
pub use index::{Extracted, Index};
pub use mask::{MaskKind, MatrixMask, VectorMask};
pub use matrix::{Orientation, RawCompressed, SparseMatrix};
pub use ops::{ApplyOp, BinaryOp, Monoid, Semiring, UnaryOp};
pub use scalar::SparseScalar;
pub use vector::{RawVector, SparseVector};
