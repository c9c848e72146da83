//! Chained indexing resolved to a read or a write at the point of use.

use sparse_kernels::{DType, Index, KernelError, Scalar};

use crate::error::{BlockExprError, Result};
use crate::graph::Delayed;
use crate::grid::BlockGrid;
use crate::inner::Inner;
use crate::mask::Mask;
use crate::meta::Meta;
use crate::object::PartitionedObject;
use crate::options::WriteOptions;
use crate::partition::BlockPartition;
use crate::updater::Updater;

/// Indexing that has not touched any storage yet.
///
/// Reading it with [`LazyIndexer::new_object`] extracts the selection into a
/// fresh object; [`LazyIndexer::as_writable`] turns it into an [`Updater`]
/// scoped to the same index.
#[derive(Debug, Clone)]
pub struct LazyIndexer {
    source: PartitionedObject,
    /// One key per axis for every level, innermost first.
    levels: Vec<Vec<Index>>,
    /// Qualifiers of the updater this indexer was taken from.
    qualifiers: Option<WriteOptions>,
    meta: Meta,
}

/// Consecutive selected positions that fall in one source block.
#[derive(Debug, Clone)]
struct Run {
    /// `None` for the placeholder run of an empty selection.
    block: Option<usize>,
    local: Vec<usize>,
}

fn axis_runs(key: &Index, partition: &BlockPartition) -> Result<Vec<Run>> {
    let size = partition.total_dim();
    let mut runs: Vec<Run> = Vec::new();
    for pos in key.resolve(size)? {
        let (block, local) = partition
            .locate(pos)
            .ok_or(KernelError::IndexOutOfBounds { index: pos, size })?;
        match runs.last_mut() {
            Some(run) if run.block == Some(block) => run.local.push(local),
            _ => runs.push(Run {
                block: Some(block),
                local: vec![local],
            }),
        }
    }
    if runs.is_empty() {
        runs.push(Run {
            block: None,
            local: Vec::new(),
        });
    }
    Ok(runs)
}

fn is_trivial(keys: &[Index], shape: &[usize]) -> bool {
    keys.iter().zip(shape).all(|(k, &n)| k.is_full(n))
}

impl LazyIndexer {
    pub(crate) fn new(
        source: PartitionedObject,
        keys: Vec<Index>,
        qualifiers: Option<WriteOptions>,
    ) -> Result<Self> {
        Self::from_levels(source, vec![keys], qualifiers)
    }

    pub(crate) fn from_levels(
        source: PartitionedObject,
        levels: Vec<Vec<Index>>,
        qualifiers: Option<WriteOptions>,
    ) -> Result<Self> {
        let mut meta = source.meta().clone();
        for keys in &levels {
            meta = meta.index(keys)?;
        }
        Ok(Self {
            source,
            levels,
            qualifiers,
            meta,
        })
    }

    /// Add another level on top of this one.
    pub fn index(&self, keys: Vec<Index>) -> Result<LazyIndexer> {
        let meta = self.meta.index(&keys)?;
        let mut levels = self.levels.clone();
        levels.push(keys);
        Ok(Self {
            source: self.source.clone(),
            levels,
            qualifiers: self.qualifiers.clone(),
            meta,
        })
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn levels(&self) -> &[Vec<Index>] {
        &self.levels
    }

    pub fn source(&self) -> &PartitionedObject {
        &self.source
    }

    /// Counts the target when its metadata has lost track of `nvals`.
    fn target_is_empty(&self) -> Result<bool> {
        match self.source.meta().nvals() {
            Some(n) => Ok(n == 0),
            None => Ok(self.source.nvals()? == 0),
        }
    }

    /// Read the selection into a fresh object.
    ///
    /// # Errors
    /// - [`BlockExprError::Unsupported`] for two or more non-trivial levels.
    /// - [`BlockExprError::Usage`] for a masked read through an updater
    ///   whose target already holds values.
    pub fn new_object(
        &self,
        dtype: Option<DType>,
        mask: Option<&Mask>,
    ) -> Result<PartitionedObject> {
        if mask.is_some() && self.qualifiers.is_some() && !self.target_is_empty()? {
            return Err(BlockExprError::Usage(
                "masked extraction requires an empty target".into(),
            ));
        }
        let meta = self.meta.new_object(dtype, mask.map(Mask::meta))?;
        let dtype = meta.dtype();

        let mut shape = self.source.shape().to_vec();
        let mut selected: Option<&[Index]> = None;
        for keys in &self.levels {
            if is_trivial(keys, &shape) {
                continue;
            }
            if selected.is_some() {
                return Err(BlockExprError::Unsupported(
                    "two or more chained index levels".into(),
                ));
            }
            selected = Some(keys.as_slice());
            shape = Meta::new(shape, dtype, None).index(keys)?.shape().to_vec();
        }
        tracing::debug!(levels = self.levels.len(), shape = ?meta.shape(), "extracting");

        let out = match selected {
            None => self.source.dup(Some(dtype)),
            Some(keys) => self.extract_blocks(keys, dtype)?,
        };
        match mask {
            Some(mask) => out.masked(mask),
            None => Ok(out),
        }
    }

    /// One extraction task per output block, reading a single source block.
    fn extract_blocks(&self, keys: &[Index], dtype: DType) -> Result<PartitionedObject> {
        let axes: Vec<(bool, Vec<Run>)> = keys
            .iter()
            .zip(self.source.partitions())
            .map(|(key, partition)| -> Result<(bool, Vec<Run>)> {
                Ok((!key.is_scalar(), axis_runs(key, partition)?))
            })
            .collect::<Result<_>>()?;
        let out_parts: Vec<BlockPartition> = axes
            .iter()
            .filter(|(keep, _)| *keep)
            .map(|(_, runs)| BlockPartition::new(runs.iter().map(|r| r.local.len()).collect()))
            .collect();
        let shape: Vec<usize> = out_parts.iter().map(BlockPartition::total_dim).collect();

        let source = self.source.grid();
        let grid = BlockGrid::from_fn(out_parts.clone(), |out_idx| {
            let mut next = 0;
            let mut src_idx = Vec::with_capacity(axes.len());
            let mut local_keys = Vec::with_capacity(axes.len());
            let mut empty = false;
            for (keep, runs) in &axes {
                let run = if *keep {
                    next += 1;
                    &runs[out_idx[next - 1]]
                } else {
                    &runs[0]
                };
                match run.block {
                    Some(b) => src_idx.push(b),
                    None => empty = true,
                }
                local_keys.push(match run.local.as_slice() {
                    [i] if !*keep => Index::At(*i),
                    local => Index::List(local.to_vec()),
                });
            }
            let name = format!("extract-{out_idx:?}");
            if empty {
                let block_shape: Vec<usize> = out_parts
                    .iter()
                    .zip(out_idx)
                    .map(|(p, &b)| p.block_size(b))
                    .collect();
                return Delayed::new(name, move || Inner::empty(dtype, &block_shape));
            }
            source.block(&src_idx).map(name, move |block| {
                Ok(block.extract(&local_keys)?.dup(Some(dtype)))
            })
        });
        Ok(PartitionedObject::from_parts(
            Meta::new(shape, dtype, None),
            grid,
        ))
    }

    /// Force a scalar selection.
    pub fn value(&self) -> Result<Option<Scalar>> {
        if !self.meta.is_scalar() {
            return Err(BlockExprError::Unsupported(format!(
                "value of a rank {} selection",
                self.meta.ndim()
            )));
        }
        self.new_object(None, None)?.value()
    }

    /// Resolve to a write into `target` through this index.
    ///
    /// Without explicit `opts`, the qualifiers of the updater this indexer
    /// came from are used.
    pub fn as_writable<'a>(
        &self,
        target: &'a mut PartitionedObject,
        opts: Option<WriteOptions>,
    ) -> Result<Updater<'a>> {
        let opts = opts
            .or_else(|| self.qualifiers.clone())
            .unwrap_or_default();
        Ok(Updater::new(target, opts)?.with_levels(self.levels.clone()))
    }
}
