//! Block partitions of object axes.

use std::ops::Range;

use crate::error::{BlockExprError, Result};

/// How one axis is cut into consecutive blocks.
///
/// An axis of size 10 cut as `[3, 4, 3]` has boundaries `[0, 3, 7, 10]`;
/// only the boundaries are stored. Zero-sized blocks are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockPartition {
    /// `[0, b0, b0 + b1, ..., total_dim]`
    bounds: Vec<usize>,
}

impl BlockPartition {
    pub fn new(block_sizes: Vec<usize>) -> Self {
        let bounds = std::iter::once(0)
            .chain(block_sizes.iter().scan(0, |end, &size| {
                *end += size;
                Some(*end)
            }))
            .collect();
        Self { bounds }
    }

    /// `num_blocks` blocks of `block_size` each.
    pub fn uniform(block_size: usize, num_blocks: usize) -> Self {
        Self::new(vec![block_size; num_blocks])
    }

    /// The whole axis as one block.
    pub fn trivial(total_dim: usize) -> Self {
        Self::new(vec![total_dim])
    }

    /// Split `total_dim` into `num_blocks` nearly equal blocks.
    ///
    /// Leading blocks take the remainder. The block count is clamped to
    /// `1..=total_dim` so that no block is empty (except for a zero-length
    /// axis, which gets one empty block).
    pub fn split(total_dim: usize, num_blocks: usize) -> Self {
        let n = num_blocks.clamp(1, total_dim.max(1));
        let base = total_dim / n;
        let extra = total_dim % n;
        Self::new((0..n).map(|i| base + usize::from(i < extra)).collect())
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.bounds.len() - 1
    }

    #[inline]
    pub fn total_dim(&self) -> usize {
        self.bounds[self.bounds.len() - 1]
    }

    #[inline]
    pub fn block_size(&self, block: usize) -> usize {
        self.bounds[block + 1] - self.bounds[block]
    }

    /// Global positions covered by `block`.
    #[inline]
    pub fn block_range(&self, block: usize) -> Range<usize> {
        self.bounds[block]..self.bounds[block + 1]
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        self.bounds.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Block holding global position `global`, and the position inside it.
    ///
    /// Returns `None` past the end of the axis.
    pub fn locate(&self, global: usize) -> Option<(usize, usize)> {
        if global >= self.total_dim() {
            return None;
        }
        // Last bound <= global; empty blocks share their bound with the
        // next block, so this lands on the nonempty one.
        let block = self.bounds.partition_point(|&b| b <= global) - 1;
        Some((block, global - self.bounds[block]))
    }

    /// Blocks of `self` overlapping `range`, with the overlap in local
    /// coordinates of each block.
    pub fn overlaps(&self, range: Range<usize>) -> Vec<(usize, Range<usize>)> {
        (0..self.num_blocks())
            .filter_map(|b| {
                let block = self.block_range(b);
                let start = block.start.max(range.start);
                let end = block.end.min(range.end);
                (start < end).then(|| (b, start - block.start..end - block.start))
            })
            .collect()
    }
}

/// Multi-dimensional block index.
pub type BlockIndex = Vec<usize>;

/// Row-major position of `block_idx` in a grid of `num_blocks` blocks.
///
/// # Errors
/// - [`BlockExprError::RankMismatch`] if the index and grid ranks differ.
/// - [`BlockExprError::Usage`] if a component is past its axis.
pub fn block_linear_index(block_idx: &[usize], num_blocks: &[usize]) -> Result<usize> {
    if block_idx.len() != num_blocks.len() {
        return Err(BlockExprError::RankMismatch {
            expected: num_blocks.len(),
            actual: block_idx.len(),
        });
    }
    if let Some((axis, (&b, &n))) = block_idx
        .iter()
        .zip(num_blocks)
        .enumerate()
        .find(|(_, (&b, &n))| b >= n)
    {
        return Err(BlockExprError::Usage(format!(
            "block {b} out of range for axis {axis} with {n} blocks"
        )));
    }
    Ok(linear_index(block_idx, num_blocks))
}

/// [`block_linear_index`] for indices produced inside the crate.
pub(crate) fn linear_index(block_idx: &[usize], num_blocks: &[usize]) -> usize {
    debug_assert_eq!(block_idx.len(), num_blocks.len());
    block_idx
        .iter()
        .zip(num_blocks)
        .fold(0, |linear, (&b, &n)| linear * n + b)
}

/// Inverse of [`block_linear_index`].
pub fn block_multi_index(mut linear: usize, num_blocks: &[usize]) -> BlockIndex {
    let mut idx = vec![0; num_blocks.len()];
    for (slot, &n) in idx.iter_mut().zip(num_blocks).rev() {
        *slot = linear % n;
        linear /= n;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_and_uniform() {
        let p = BlockPartition::trivial(10);
        assert_eq!(p.num_blocks(), 1);
        assert_eq!(p.total_dim(), 10);
        assert_eq!(p.block_range(0), 0..10);
        let u = BlockPartition::uniform(3, 4);
        assert_eq!(u.total_dim(), 12);
        assert_eq!(u.block_range(2), 6..9);
    }

    #[test]
    fn test_split() {
        assert_eq!(BlockPartition::split(10, 3).block_sizes(), vec![4, 3, 3]);
        assert_eq!(BlockPartition::split(2, 5).block_sizes(), vec![1, 1]);
        assert_eq!(BlockPartition::split(0, 3).block_sizes(), vec![0]);
        assert_eq!(BlockPartition::split(0, 3).total_dim(), 0);
    }

    #[test]
    fn test_locate() {
        let p = BlockPartition::new(vec![2, 0, 3]);
        assert_eq!(p.block_size(1), 0);
        assert_eq!(p.locate(0), Some((0, 0)));
        assert_eq!(p.locate(2), Some((2, 0)));
        assert_eq!(p.locate(4), Some((2, 2)));
        assert_eq!(p.locate(5), None);
    }

    #[test]
    fn test_overlaps() {
        let p = BlockPartition::new(vec![3, 3, 3]);
        assert_eq!(p.overlaps(2..7), vec![(0, 2..3), (1, 0..3), (2, 0..1)]);
    }

    #[test]
    fn test_linear_multi_round_trip() {
        let nb = [2, 3, 4];
        for lin in 0..24 {
            let idx = block_multi_index(lin, &nb);
            assert_eq!(block_linear_index(&idx, &nb).unwrap(), lin);
        }
        assert_eq!(block_linear_index(&[1, 2, 3], &nb).unwrap(), 23);
        assert_eq!(block_linear_index(&[], &[]).unwrap(), 0);
    }

    #[test]
    fn test_linear_index_errors() {
        assert_eq!(
            block_linear_index(&[0, 1], &[2, 3, 4]),
            Err(BlockExprError::RankMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert!(matches!(
            block_linear_index(&[0, 3], &[2, 3]),
            Err(BlockExprError::Usage(_))
        ));
    }
}
