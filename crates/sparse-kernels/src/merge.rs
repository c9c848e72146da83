//! Merges over sorted `(key, value)` entry lists.
//!
//! Vectors use `usize` keys and matrices use `(row, col)` keys in row-major
//! order; every pointwise kernel is expressed as one of these merges.

use std::cmp::Ordering;

use crate::dtype::{DType, Scalar};
use crate::error::Result;
use crate::ops::BinaryOp;

/// Walk two sorted entry lists in key order.
fn merge_walk<K, F>(lhs: &[(K, Scalar)], rhs: &[(K, Scalar)], mut visit: F) -> Result<()>
where
    K: Ord + Copy,
    F: FnMut(K, Option<Scalar>, Option<Scalar>) -> Result<()>,
{
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() || j < rhs.len() {
        let order = match (lhs.get(i), rhs.get(j)) {
            (Some(a), Some(b)) => a.0.cmp(&b.0),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        match order {
            Ordering::Less => {
                visit(lhs[i].0, Some(lhs[i].1), None)?;
                i += 1;
            }
            Ordering::Greater => {
                visit(rhs[j].0, None, Some(rhs[j].1))?;
                j += 1;
            }
            Ordering::Equal => {
                visit(lhs[i].0, Some(lhs[i].1), Some(rhs[j].1))?;
                i += 1;
                j += 1;
            }
        }
    }
    Ok(())
}

/// Union: `op` on the intersection, single-sided entries pass through.
pub(crate) fn union_with<K: Ord + Copy>(
    lhs: &[(K, Scalar)],
    rhs: &[(K, Scalar)],
    op: BinaryOp,
    dtype: DType,
) -> Result<Vec<(K, Scalar)>> {
    let mut out = Vec::with_capacity(lhs.len().max(rhs.len()));
    merge_walk(lhs, rhs, |k, a, b| {
        let z = match (a, b) {
            (Some(a), Some(b)) => op.apply(a, b)?,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return Ok(()),
        };
        out.push((k, z.cast(dtype)));
        Ok(())
    })?;
    Ok(out)
}

/// Intersection: `op` where both sides hold a value.
pub(crate) fn intersect_with<K: Ord + Copy>(
    lhs: &[(K, Scalar)],
    rhs: &[(K, Scalar)],
    op: BinaryOp,
    dtype: DType,
) -> Result<Vec<(K, Scalar)>> {
    let mut out = Vec::new();
    merge_walk(lhs, rhs, |k, a, b| {
        if let (Some(a), Some(b)) = (a, b) {
            out.push((k, op.apply(a, b)?.cast(dtype)));
        }
        Ok(())
    })?;
    Ok(out)
}

/// Masked, accumulated, replace-qualified write of `source` over `target`.
///
/// `Z = accum ? target ⊕ source : source`; positions the mask allows take
/// `Z`, other positions keep the old target entry unless `replace` is set.
pub(crate) fn qualified_merge<K, M>(
    target: &[(K, Scalar)],
    source: &[(K, Scalar)],
    allows: M,
    accum: Option<BinaryOp>,
    replace: bool,
    dtype: DType,
) -> Result<Vec<(K, Scalar)>>
where
    K: Ord + Copy,
    M: Fn(K) -> bool,
{
    let mut out = Vec::with_capacity(target.len().max(source.len()));
    merge_walk(target, source, |k, old, new| {
        if allows(k) {
            let z = match (old, new, accum) {
                (Some(o), Some(n), Some(op)) => Some(op.apply(o, n)?),
                (Some(o), None, Some(_)) => Some(o),
                (_, Some(n), _) => Some(n),
                (_, None, None) => None,
                (None, None, Some(_)) => None,
            };
            if let Some(z) = z {
                out.push((k, z.cast(dtype)));
            }
        } else if !replace {
            if let Some(o) = old {
                out.push((k, o));
            }
        }
        Ok(())
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(usize, i64)]) -> Vec<(usize, Scalar)> {
        pairs.iter().map(|&(k, v)| (k, Scalar::Int64(v))).collect()
    }

    #[test]
    fn test_union_and_intersection() {
        let a = entries(&[(0, 1), (2, 3)]);
        let b = entries(&[(2, 10), (5, 7)]);
        let u = union_with(&a, &b, BinaryOp::Plus, DType::Int64).unwrap();
        assert_eq!(u, entries(&[(0, 1), (2, 13), (5, 7)]));
        let i = intersect_with(&a, &b, BinaryOp::Times, DType::Int64).unwrap();
        assert_eq!(i, entries(&[(2, 30)]));
    }

    #[test]
    fn test_qualified_merge_replace_clears_outside_mask() {
        let target = entries(&[(0, 1), (1, 1), (2, 1)]);
        let source = entries(&[(0, 5), (2, 5)]);
        let kept = qualified_merge(&target, &source, |k| k != 1, None, false, DType::Int64)
            .unwrap();
        assert_eq!(kept, entries(&[(0, 5), (1, 1), (2, 5)]));
        let replaced =
            qualified_merge(&target, &source, |k| k != 1, None, true, DType::Int64).unwrap();
        assert_eq!(replaced, entries(&[(0, 5), (2, 5)]));
    }

    #[test]
    fn test_qualified_merge_accumulates() {
        let target = entries(&[(0, 1), (1, 1)]);
        let source = entries(&[(1, 5), (3, 2)]);
        let out = qualified_merge(
            &target,
            &source,
            |_| true,
            Some(BinaryOp::Plus),
            false,
            DType::Int64,
        )
        .unwrap();
        assert_eq!(out, entries(&[(0, 1), (1, 6), (3, 2)]));
    }
}
