//! Grids of delayed blocks and the blockwise operations over them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BlockExprError, Result};
use crate::graph::Delayed;
use crate::partition::{block_multi_index, linear_index, BlockPartition};

/// One delayed block per cell of a block grid, stored in row-major order.
///
/// A grid of rank 0 has no partitions and exactly one block.
#[derive(Debug, Clone)]
pub struct BlockGrid<T> {
    partitions: Vec<BlockPartition>,
    blocks: Vec<Delayed<T>>,
}

fn block_count(partitions: &[BlockPartition]) -> usize {
    partitions.iter().map(BlockPartition::num_blocks).product()
}

impl<T: Clone + Send + 'static> BlockGrid<T> {
    /// # Errors
    /// Returns [`BlockExprError::RankMismatch`] when the number of blocks
    /// does not match the partitions.
    pub fn new(partitions: Vec<BlockPartition>, blocks: Vec<Delayed<T>>) -> Result<Self> {
        let expected = block_count(&partitions);
        if blocks.len() != expected {
            return Err(BlockExprError::RankMismatch {
                expected,
                actual: blocks.len(),
            });
        }
        Ok(Self { partitions, blocks })
    }

    /// Build a grid by creating the block at every block index.
    pub fn from_fn(
        partitions: Vec<BlockPartition>,
        mut f: impl FnMut(&[usize]) -> Delayed<T>,
    ) -> Self {
        let num_blocks: Vec<usize> = partitions.iter().map(BlockPartition::num_blocks).collect();
        let blocks = (0..block_count(&partitions))
            .map(|lin| f(&block_multi_index(lin, &num_blocks)))
            .collect();
        Self { partitions, blocks }
    }

    pub fn partitions(&self) -> &[BlockPartition] {
        &self.partitions
    }

    pub fn ndim(&self) -> usize {
        self.partitions.len()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.partitions.iter().map(BlockPartition::total_dim).collect()
    }

    pub fn num_blocks(&self) -> Vec<usize> {
        self.partitions.iter().map(BlockPartition::num_blocks).collect()
    }

    pub fn blocks(&self) -> &[Delayed<T>] {
        &self.blocks
    }

    pub fn block(&self, block_idx: &[usize]) -> &Delayed<T> {
        &self.blocks[linear_index(block_idx, &self.num_blocks())]
    }

    /// Logical shape of one block.
    pub fn block_shape(&self, block_idx: &[usize]) -> Vec<usize> {
        self.partitions
            .iter()
            .zip(block_idx)
            .map(|(p, &b)| p.block_size(b))
            .collect()
    }

    /// Whether every block has been computed.
    pub fn is_evaluated(&self) -> bool {
        self.blocks.iter().all(Delayed::is_evaluated)
    }

    fn map_into<U, F>(&self, partitions: Vec<BlockPartition>, name: &str, f: F) -> BlockGrid<U>
    where
        U: Clone + Send + 'static,
        F: Fn(&[usize], T) -> Result<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let num_blocks = self.num_blocks();
        let blocks = self
            .blocks
            .iter()
            .enumerate()
            .map(|(lin, block)| {
                let f = Arc::clone(&f);
                let idx = block_multi_index(lin, &num_blocks);
                block.map(format!("{name}-{lin}"), move |value| f(&idx, value))
            })
            .collect();
        BlockGrid { partitions, blocks }
    }

    /// Apply `f` to every block independently.
    pub fn map_blocks<U, F>(&self, name: &str, f: F) -> BlockGrid<U>
    where
        U: Clone + Send + 'static,
        F: Fn(&[usize], T) -> Result<U> + Send + Sync + 'static,
    {
        self.map_into(self.partitions.clone(), name, f)
    }

    /// Like [`BlockGrid::map_blocks`], for block functions that add or drop
    /// unit axes. The block count must not change.
    pub fn map_blocks_reshaped<U, F>(
        &self,
        partitions: Vec<BlockPartition>,
        name: &str,
        f: F,
    ) -> Result<BlockGrid<U>>
    where
        U: Clone + Send + 'static,
        F: Fn(&[usize], T) -> Result<U> + Send + Sync + 'static,
    {
        let expected = self.blocks.len();
        let actual = block_count(&partitions);
        if expected != actual {
            return Err(BlockExprError::RankMismatch { expected, actual });
        }
        Ok(self.map_into(partitions, name, f))
    }

    /// Combine aligned blocks of grids with identical partitions.
    pub fn elementwise<U, F>(name: &str, inputs: &[&BlockGrid<T>], f: F) -> Result<BlockGrid<U>>
    where
        U: Clone + Send + 'static,
        F: Fn(&[usize], Vec<T>) -> Result<U> + Send + Sync + 'static,
    {
        let first = inputs
            .first()
            .ok_or_else(|| BlockExprError::Usage("elementwise needs an input".into()))?;
        if let Some(other) = inputs.iter().find(|g| g.partitions != first.partitions) {
            return Err(BlockExprError::IncompatiblePartitions(format!(
                "{:?} vs {:?}",
                first.partitions, other.partitions
            )));
        }
        let f = Arc::new(f);
        let num_blocks = first.num_blocks();
        let blocks = (0..first.blocks.len())
            .map(|lin| {
                let deps: Vec<Delayed<T>> = inputs.iter().map(|g| g.blocks[lin].clone()).collect();
                let f = Arc::clone(&f);
                let idx = block_multi_index(lin, &num_blocks);
                Delayed::after(format!("{name}-{lin}"), deps, move |values| f(&idx, values))
            })
            .collect();
        Ok(BlockGrid {
            partitions: first.partitions.clone(),
            blocks,
        })
    }

    /// Label-aligned block map.
    ///
    /// Every input axis carries a label; inputs sharing a label must share
    /// its partition. The output has one block per combination of output
    /// label blocks, and `f` receives one block from each input, selected by
    /// that combination. Every input label must appear in `out_labels`.
    /// `adjust_chunks` replaces the block size along a label in the output.
    pub fn blockwise<U, F>(
        name: &str,
        out_labels: &[char],
        inputs: &[(&BlockGrid<T>, &[char])],
        adjust_chunks: &[(char, usize)],
        f: F,
    ) -> Result<BlockGrid<U>>
    where
        U: Clone + Send + 'static,
        F: Fn(&[usize], Vec<T>) -> Result<U> + Send + Sync + 'static,
    {
        let mut label_parts: HashMap<char, &BlockPartition> = HashMap::new();
        for (grid, labels) in inputs {
            if labels.len() != grid.ndim() {
                return Err(BlockExprError::RankMismatch {
                    expected: grid.ndim(),
                    actual: labels.len(),
                });
            }
            for (label, partition) in labels.iter().zip(&grid.partitions) {
                if !out_labels.contains(label) {
                    return Err(BlockExprError::Unsupported(format!(
                        "label '{label}' would be contracted inside a block map"
                    )));
                }
                match label_parts.get(label) {
                    Some(&known) if known != partition => {
                        return Err(BlockExprError::IncompatiblePartitions(format!(
                            "label '{label}': {known:?} vs {partition:?}"
                        )));
                    }
                    Some(_) => {}
                    None => {
                        label_parts.insert(*label, partition);
                    }
                }
            }
        }

        let mut out_parts = Vec::with_capacity(out_labels.len());
        for label in out_labels {
            let partition = label_parts.get(label).ok_or_else(|| {
                BlockExprError::Usage(format!("output label '{label}' is on no input"))
            })?;
            let partition = match adjust_chunks.iter().find(|(l, _)| l == label) {
                Some(&(_, size)) => BlockPartition::uniform(size, partition.num_blocks()),
                None => (*partition).clone(),
            };
            out_parts.push(partition);
        }

        let positions: Vec<Vec<usize>> = inputs
            .iter()
            .map(|(_, labels)| {
                labels
                    .iter()
                    .filter_map(|l| out_labels.iter().position(|o| o == l))
                    .collect()
            })
            .collect();
        let f = Arc::new(f);
        let out = BlockGrid::from_fn(out_parts, |out_idx| {
            let deps: Vec<Delayed<T>> = inputs
                .iter()
                .zip(&positions)
                .map(|((grid, _), pos)| {
                    let idx: Vec<usize> = pos.iter().map(|&p| out_idx[p]).collect();
                    grid.block(&idx).clone()
                })
                .collect();
            let f = Arc::clone(&f);
            let idx = out_idx.to_vec();
            Delayed::after(format!("{name}-{idx:?}"), deps, move |values| f(&idx, values))
        });
        Ok(out)
    }

    /// Two-phase reduction over `axes`.
    ///
    /// `map_fn` runs on every block; the partials of each output block are
    /// then folded by `combine_fn` in a tree with fan-in `split_every`. A
    /// lone partial passes through without calling `combine_fn`. Reduced
    /// axes are dropped unless `keepdims`, in which case they remain with a
    /// single block of size 1.
    pub fn reduce_blocks<U, M, C>(
        &self,
        name: &str,
        axes: &[usize],
        map_fn: M,
        combine_fn: C,
        split_every: usize,
        keepdims: bool,
    ) -> Result<BlockGrid<U>>
    where
        U: Clone + Send + 'static,
        M: Fn(&[usize], T) -> Result<U> + Send + Sync + 'static,
        C: Fn(Vec<U>) -> Result<U> + Send + Sync + 'static,
    {
        if let Some(&axis) = axes.iter().find(|&&a| a >= self.ndim()) {
            return Err(BlockExprError::Usage(format!(
                "axis {axis} out of range for rank {}",
                self.ndim()
            )));
        }
        if split_every < 2 {
            return Err(BlockExprError::Usage(format!(
                "split_every must be at least 2, got {split_every}"
            )));
        }

        let mapped = self.map_blocks(&format!("{name}-map"), map_fn);
        let out_axis = |axis: usize, value: usize| {
            if axes.contains(&axis) {
                keepdims.then_some(0)
            } else {
                Some(value)
            }
        };
        let out_parts: Vec<BlockPartition> = self
            .partitions
            .iter()
            .enumerate()
            .filter_map(|(axis, p)| {
                out_axis(axis, 0).map(|_| {
                    if axes.contains(&axis) {
                        BlockPartition::trivial(1)
                    } else {
                        p.clone()
                    }
                })
            })
            .collect();
        let out_nb: Vec<usize> = out_parts.iter().map(BlockPartition::num_blocks).collect();

        let in_nb = self.num_blocks();
        let mut groups: Vec<Vec<Delayed<U>>> = vec![Vec::new(); block_count(&out_parts)];
        for (lin, block) in mapped.blocks.iter().enumerate() {
            let idx = block_multi_index(lin, &in_nb);
            let out_idx: Vec<usize> = idx
                .iter()
                .enumerate()
                .filter_map(|(axis, &b)| out_axis(axis, b))
                .collect();
            groups[linear_index(&out_idx, &out_nb)].push(block.clone());
        }

        tracing::debug!(
            op = name,
            partials = self.blocks.len(),
            outputs = groups.len(),
            split_every,
            "building combine tree"
        );
        let combine = Arc::new(combine_fn);
        let blocks = groups
            .into_iter()
            .enumerate()
            .map(|(group, partials)| combine_tree(name, group, partials, split_every, &combine))
            .collect::<Result<Vec<_>>>()?;
        Ok(BlockGrid {
            partitions: out_parts,
            blocks,
        })
    }
}

fn combine_tree<U, C>(
    name: &str,
    group: usize,
    mut level: Vec<Delayed<U>>,
    split_every: usize,
    combine: &Arc<C>,
) -> Result<Delayed<U>>
where
    U: Clone + Send + 'static,
    C: Fn(Vec<U>) -> Result<U> + Send + Sync + 'static,
{
    let mut depth = 0;
    while level.len() > 1 {
        level = level
            .chunks(split_every)
            .enumerate()
            .map(|(i, chunk)| {
                if let [single] = chunk {
                    return single.clone();
                }
                let deps = chunk.to_vec();
                let combine = Arc::clone(combine);
                Delayed::after(
                    format!("{name}-combine-{group}-{depth}-{i}"),
                    deps,
                    move |values| combine(values),
                )
            })
            .collect();
        depth += 1;
    }
    level
        .pop()
        .ok_or_else(|| BlockExprError::Usage("reduction over an axis with no blocks".into()))
}
