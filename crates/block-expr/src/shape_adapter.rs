//! Zero-copy conversion between 1-D blocks and single-row/column matrices.

use std::sync::Arc;

use sparse_kernels::{RawCompressed, RawVector, SparseMatrix, SparseVector};

use crate::error::{BlockExprError, Result};

fn single_slot(vector: &SparseVector, nrows: usize, ncols: usize) -> RawCompressed {
    let raw = vector.export_raw();
    RawCompressed {
        nrows,
        ncols,
        dtype: raw.dtype,
        indptr: Arc::from(vec![0, raw.nvals()]),
        indices: raw.indices,
        values: raw.values,
    }
}

/// View a vector of size `n` as a `1 x n` CSR matrix over the same arrays.
pub fn as_one_row_matrix(vector: &SparseVector) -> Result<SparseMatrix> {
    Ok(SparseMatrix::import_csr(single_slot(vector, 1, vector.size()))?)
}

/// View a vector of size `n` as an `n x 1` CSC matrix over the same arrays.
pub fn as_one_col_matrix(vector: &SparseVector) -> Result<SparseMatrix> {
    Ok(SparseMatrix::import_csc(single_slot(vector, vector.size(), 1))?)
}

/// Inverse of the two lifts.
///
/// # Errors
/// Returns [`BlockExprError::Unsupported`] unless the matrix has exactly one
/// row or exactly one column.
pub fn as_vector(matrix: &SparseMatrix) -> Result<SparseVector> {
    let (raw, size) = if matrix.nrows() == 1 {
        (matrix.export_csr(), matrix.ncols())
    } else if matrix.ncols() == 1 {
        (matrix.export_csc(), matrix.nrows())
    } else {
        return Err(BlockExprError::Unsupported(format!(
            "cannot view a {}x{} matrix as a vector",
            matrix.nrows(),
            matrix.ncols()
        )));
    };
    Ok(SparseVector::import_raw(RawVector {
        size,
        dtype: raw.dtype,
        indices: raw.indices,
        values: raw.values,
    })?)
}
