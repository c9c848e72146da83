//! End-to-end scenarios for block-expr
//!
//! Tests cover:
//! - Matrix-vector product written into an existing vector
//! - Full reductions of blocked matrices and vectors
//! - Masked row-wise reduction with and without replace
//! - Repeated accumulated elementwise writes

use anyhow::Result;
use block_expr::{BlockPartition, PartitionedObject, WriteOptions};
use sparse_kernels::{BinaryOp, DType, Monoid, Scalar, Semiring, SparseMatrix, SparseVector};

fn int_matrix(entries: &[(usize, usize, i64)], nrows: usize, ncols: usize) -> SparseMatrix {
    SparseMatrix::from_values(
        entries.iter().map(|e| e.0).collect(),
        entries.iter().map(|e| e.1).collect(),
        entries.iter().map(|e| Scalar::Int64(e.2)).collect(),
        nrows,
        ncols,
        Some(DType::Int64),
    )
    .unwrap()
}

fn blocked(m: &SparseMatrix, row_blocks: usize, col_blocks: usize) -> PartitionedObject {
    PartitionedObject::from_matrix(
        m,
        BlockPartition::split(m.nrows(), row_blocks),
        BlockPartition::split(m.ncols(), col_blocks),
    )
    .unwrap()
}

fn int_vector(entries: &[(usize, i64)], size: usize) -> SparseVector {
    SparseVector::from_values(
        entries.iter().map(|e| e.0).collect(),
        entries.iter().map(|e| Scalar::Int64(e.1)).collect(),
        size,
        Some(DType::Int64),
    )
    .unwrap()
}

#[test]
fn test_mxv_into_existing_vector() -> Result<()> {
    // A = [[1, 0, 2],
    //      [0, 3, 0],
    //      [4, 0, 0]]
    let a = int_matrix(&[(0, 0, 1), (0, 2, 2), (1, 1, 3), (2, 0, 4)], 3, 3);
    let v = int_vector(&[(0, 5), (2, 7)], 3);
    let a_obj = blocked(&a, 2, 2);
    let v_obj = PartitionedObject::from_vector(&v, BlockPartition::split(3, 2))?;

    let mut u = PartitionedObject::new_vector(DType::Int64, BlockPartition::split(3, 2));
    u.update(&a_obj.mxv(&v_obj, Semiring::plus_times())?)?;

    let dense_a = [[1, 0, 2], [0, 3, 0], [4, 0, 0]];
    let dense_v = [5, 0, 7];
    let result = u.to_vector()?;
    for (i, row) in dense_a.iter().enumerate() {
        let expected: i64 = row.iter().zip(&dense_v).map(|(x, y)| x * y).sum();
        match result.get(i) {
            Some(value) => assert_eq!(value, Scalar::Int64(expected)),
            None => assert_eq!(expected, 0),
        }
    }
    // Row 1 only meets the missing v[1].
    assert_eq!(result.nvals(), 2);
    Ok(())
}

#[test]
fn test_reduce_matrix_in_four_blocks() -> Result<()> {
    let a = int_matrix(&[(0, 0, 3), (0, 3, -1), (1, 2, 8), (3, 1, 5), (3, 3, 2)], 4, 4);
    let expected: i64 = a.entries().iter().map(|(_, v)| v.as_i64()).sum();

    let a_obj = blocked(&a, 2, 2);
    assert_eq!(a_obj.grid().blocks().len(), 4);
    let s = a_obj.reduce_scalar(Monoid::PLUS)?.new_object(None, None)?;
    assert_eq!(s.value()?, Some(Scalar::Int64(expected)));
    Ok(())
}

#[test]
fn test_reduce_vector_in_four_blocks() -> Result<()> {
    let v = int_vector(&[(0, 1), (3, 2), (4, 3), (7, 4), (9, 5)], 10);
    let v_obj = PartitionedObject::from_vector(&v, BlockPartition::split(10, 4))?;
    let s = v_obj.reduce(Monoid::PLUS)?.new_object(None, None)?;
    assert_eq!(s.value()?, Some(Scalar::Int64(15)));
    assert_eq!(s.value()?, v.reduce(Monoid::PLUS)?.value());
    Ok(())
}

type RowwiseSetup = (PartitionedObject, PartitionedObject, PartitionedObject);

fn rowwise_max_setup(w_entries: &[(usize, i64)]) -> Result<RowwiseSetup> {
    // Row maxima: 4, 6, 9
    let a = int_matrix(&[(0, 0, 4), (0, 1, 1), (1, 1, 6), (2, 0, 9), (2, 2, 3)], 3, 3);
    let a_obj = blocked(&a, 2, 3);
    let w = PartitionedObject::from_vector(&int_vector(w_entries, 3), BlockPartition::split(3, 2))?;
    let m = PartitionedObject::from_vector(
        &SparseVector::from_values(vec![0, 2], vec![Scalar::Bool(true); 2], 3, None)?,
        BlockPartition::trivial(3),
    )?;
    Ok((a_obj, w, m))
}

#[test]
fn test_masked_rowwise_max_with_replace() -> Result<()> {
    let (a, mut w, m) = rowwise_max_setup(&[(0, -1), (2, -1)])?;
    let opts = WriteOptions::default()
        .with_mask(m.structure_mask())
        .with_replace(true);
    w.updater(opts)?.write(&a.reduce_rowwise(Monoid::MAX)?)?;

    let result = w.to_vector()?;
    assert_eq!(result.get(0), Some(Scalar::Int64(4)));
    assert_eq!(result.get(1), None);
    assert_eq!(result.get(2), Some(Scalar::Int64(9)));
    Ok(())
}

#[test]
fn test_replace_clears_unselected_rows() -> Result<()> {
    let (a, mut w, m) = rowwise_max_setup(&[(0, -1), (1, 7), (2, -1)])?;
    let opts = WriteOptions::default()
        .with_mask(m.structure_mask())
        .with_replace(true);
    w.updater(opts)?.write(&a.reduce_rowwise(Monoid::MAX)?)?;
    let result = w.to_vector()?;
    assert_eq!(result.get(1), None);
    assert_eq!(result.nvals(), 2);
    Ok(())
}

#[test]
fn test_masked_write_without_replace_keeps_unselected_rows() -> Result<()> {
    let (a, mut w, m) = rowwise_max_setup(&[(0, -1), (1, 7), (2, -1)])?;
    w.updater(WriteOptions::default().with_mask(m.structure_mask()))?
        .write(&a.reduce_rowwise(Monoid::MAX)?)?;
    let result = w.to_vector()?;
    assert_eq!(result.get(0), Some(Scalar::Int64(4)));
    assert_eq!(result.get(1), Some(Scalar::Int64(7)));
    assert_eq!(result.get(2), Some(Scalar::Int64(9)));
    Ok(())
}

#[test]
fn test_accumulated_ewise_add_twice() -> Result<()> {
    let a = int_matrix(&[(0, 0, 1), (1, 2, 4), (2, 1, -3)], 3, 3);
    let b = int_matrix(&[(0, 0, 2), (0, 2, 5), (2, 1, 3)], 3, 3);
    let a_obj = blocked(&a, 2, 2);
    let b_obj = blocked(&b, 3, 1);
    let mut c = PartitionedObject::new_matrix(
        DType::Int64,
        BlockPartition::split(3, 2),
        BlockPartition::split(3, 2),
    );

    let expr = a_obj.ewise_add(&b_obj, BinaryOp::Plus)?;
    for _ in 0..2 {
        c.updater(WriteOptions::default().with_accum(BinaryOp::Plus))?.write(&expr)?;
    }

    let sum = a.ewise_add(&b, BinaryOp::Plus)?;
    let result = c.to_matrix()?;
    assert_eq!(result.nvals(), sum.nvals());
    for ((r, col), v) in sum.entries() {
        assert_eq!(result.get(r, col), Some(Scalar::Int64(2 * v.as_i64())));
    }
    Ok(())
}
