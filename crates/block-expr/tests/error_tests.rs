//! Error handling tests for block-expr
//!
//! Tests cover:
//! - Usage errors from write qualifiers and indexing
//! - Unsupported operations
//! - Partition mismatches in products
//! - Backend errors surfacing when results are forced

use block_expr::{
    BlockExprError, BlockPartition, OperationKind, PartitionedObject, ReduceOptions, WriteOptions,
    DEFAULT_SPLIT_EVERY,
};
use sparse_kernels::{
    BinaryOp, DType, Index, KernelError, Monoid, Scalar, Semiring, SparseMatrix, SparseVector,
};

fn vector(entries: &[(usize, i64)], size: usize, blocks: usize) -> PartitionedObject {
    let v = SparseVector::from_values(
        entries.iter().map(|e| e.0).collect(),
        entries.iter().map(|e| Scalar::Int64(e.1)).collect(),
        size,
        Some(DType::Int64),
    )
    .unwrap();
    PartitionedObject::from_vector(&v, BlockPartition::split(size, blocks)).unwrap()
}

fn identity_matrix(n: usize, row_blocks: usize, col_blocks: usize) -> PartitionedObject {
    let m = SparseMatrix::from_values(
        (0..n).collect(),
        (0..n).collect(),
        vec![Scalar::Int64(1); n],
        n,
        n,
        None,
    )
    .unwrap();
    PartitionedObject::from_matrix(
        &m,
        BlockPartition::split(n, row_blocks),
        BlockPartition::split(n, col_blocks),
    )
    .unwrap()
}

#[test]
fn test_replace_without_mask_is_usage_error() {
    let mut w = vector(&[], 4, 2);
    let err = w
        .updater(WriteOptions::default().with_replace(true).with_accum(BinaryOp::Plus))
        .unwrap_err();
    assert!(matches!(err, BlockExprError::Usage(_)));
}

#[test]
fn test_two_chained_index_levels_are_unsupported() {
    let a = identity_matrix(6, 2, 2);
    let chained = a
        .index(vec![Index::Range(1..5), Index::All])
        .unwrap()
        .index(vec![Index::List(vec![0, 2]), Index::At(3)])
        .unwrap();
    assert_eq!(chained.meta().shape(), &[2]);
    let err = chained.new_object(None, None).unwrap_err();
    assert!(matches!(err, BlockExprError::Unsupported(_)));
}

#[test]
fn test_masked_extraction_requires_empty_target() {
    let mask = vector(&[(0, 1)], 2, 1).structure_mask();

    let mut full = vector(&[(1, 3)], 4, 2);
    let updater = full.updater(WriteOptions::default()).unwrap();
    let indexer = updater.index(vec![Index::Range(0..2)]).unwrap();
    let err = indexer.new_object(None, Some(&mask)).unwrap_err();
    assert!(matches!(err, BlockExprError::Usage(_)));

    let mut empty = PartitionedObject::new_vector(DType::Int64, BlockPartition::split(4, 2));
    let updater = empty.updater(WriteOptions::default()).unwrap();
    let out = updater
        .index(vec![Index::Range(0..2)])
        .unwrap()
        .new_object(None, Some(&mask))
        .unwrap();
    assert_eq!(out.nvals().unwrap(), 0);
}

#[test]
fn test_masked_extraction_counts_target_of_unknown_size() {
    let mask = vector(&[(0, 1)], 2, 1).structure_mask();
    let blank = vector(&[], 4, 2);
    let nothing = blank.ewise_add(&blank, BinaryOp::Plus).unwrap();

    let mut target = PartitionedObject::new_vector(DType::Int64, BlockPartition::split(4, 2));
    target.update(&nothing).unwrap();
    assert_eq!(target.meta().nvals(), None);
    let updater = target.updater(WriteOptions::default()).unwrap();
    let out = updater
        .index(vec![Index::Range(0..2)])
        .unwrap()
        .new_object(None, Some(&mask))
        .unwrap();
    assert_eq!(out.nvals().unwrap(), 0);

    let something = vector(&[(3, 5)], 4, 2).ewise_add(&blank, BinaryOp::Plus).unwrap();
    let mut target = PartitionedObject::new_vector(DType::Int64, BlockPartition::split(4, 2));
    target.update(&something).unwrap();
    assert_eq!(target.meta().nvals(), None);
    let updater = target.updater(WriteOptions::default()).unwrap();
    let err = updater
        .index(vec![Index::Range(0..2)])
        .unwrap()
        .new_object(None, Some(&mask))
        .unwrap_err();
    assert!(matches!(err, BlockExprError::Usage(_)));
}

#[test]
fn test_unknown_operation_name() {
    assert_eq!("vxm".parse::<OperationKind>().unwrap(), OperationKind::Vxm);
    let err = "transpose".parse::<OperationKind>().unwrap_err();
    assert!(matches!(err, BlockExprError::Unsupported(_)));
}

#[test]
fn test_indexed_write_is_unsupported() {
    let src = vector(&[(0, 1)], 2, 1);
    let mut w = vector(&[], 4, 2);
    let expr = src.apply(sparse_kernels::UnaryOp::Identity).unwrap();
    let indexer = w.index(vec![Index::Range(2..4)]).unwrap();
    let err = indexer
        .as_writable(&mut w, Some(WriteOptions::default().with_accum(BinaryOp::Plus)))
        .unwrap()
        .write(&expr)
        .unwrap_err();
    assert!(matches!(err, BlockExprError::Unsupported(_)));
}

#[test]
fn test_rank_errors_fail_at_build_time() {
    let u = vector(&[(0, 1)], 3, 1);
    let a = identity_matrix(3, 1, 1);
    assert!(matches!(
        u.mxv(&u, Semiring::plus_times()),
        Err(BlockExprError::Unsupported(_))
    ));
    assert!(matches!(
        a.reduce(Monoid::PLUS),
        Err(BlockExprError::Unsupported(_))
    ));
    assert!(matches!(
        a.mxv(&vector(&[], 4, 1), Semiring::plus_times()),
        Err(BlockExprError::Backend(KernelError::DimensionMismatch { .. }))
    ));
}

#[test]
fn test_mismatched_contraction_partitions() {
    let a = identity_matrix(6, 2, 3);
    let b = identity_matrix(6, 2, 2);
    let expr = a.mxm(&b, Semiring::plus_times()).unwrap();
    let err = expr.new_object(None, None).unwrap_err();
    assert!(matches!(err, BlockExprError::IncompatiblePartitions(_)));
}

#[test]
fn test_invalid_semiring_is_usage_error() {
    let err: BlockExprError = Semiring::new(BinaryOp::Minus, BinaryOp::Times)
        .unwrap_err()
        .into();
    assert!(matches!(err, BlockExprError::Usage(_)));
}

#[test]
fn test_invalid_split_every() {
    let u = vector(&[(0, 1), (2, 2)], 4, 4);
    let expr = u
        .reduce(Monoid::PLUS)
        .unwrap()
        .with_reduce_options(ReduceOptions::default().with_split_every(1));
    assert!(matches!(expr.value(), Err(BlockExprError::Usage(_))));
    assert!(DEFAULT_SPLIT_EVERY.set(0).is_err());
}

#[test]
fn test_backend_error_surfaces_when_forced() {
    let a = vector(&[(0, 4), (1, 2)], 2, 2);
    let b = vector(&[(0, 2), (1, 0)], 2, 1);
    let out = a
        .ewise_mult(&b, BinaryOp::Div)
        .unwrap()
        .new_object(None, None)
        .unwrap();
    let err = out.to_vector().unwrap_err();
    assert!(matches!(err, BlockExprError::Backend(KernelError::DomainError(_))));
    // The failure is memoised and handed out again.
    assert_eq!(out.to_vector().unwrap_err(), err);
}
