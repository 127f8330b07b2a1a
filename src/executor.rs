//! Per-block execution.
//!
//! [`process_block`] drives one [`GridBlock`] through the pipeline:
//!
//! 1. resolve the input handle and its cell-cached view from the worker cache
//! 2. pad the block by the halo radius, clipped to the source bounds
//! 3. prefetch the padded region on the worker-local pool
//! 4. resolve the cell-cached transformed view of the whole array
//! 5. crop it to the block
//! 6. prefetch the block as one tile, so its compute runs on one thread
//! 7. skip blocks that hold only the background value
//! 8. resolve the output handle, split the block along the output storage
//!    grid and write every non-empty piece at its grid position
//!
//! All state lives in an explicit [`WorkerContext`]. Resources are immutable
//! once built, so a failing block leaves them usable for the next one.

use std::any::Any;
use std::sync::Arc;

use blockwise_view::{DenseArray, Interval, Numeric, VirtualArray};

use crate::cache::{resource_key, ResourceKind, WorkerCache};
use crate::cells::CachedCells;
use crate::config::{ResourceReuse, RunConfig};
use crate::filter::{PlanarFilterOp, PlaneFilter};
use crate::grid::{create, GridBlock, GridError};
use crate::prefetch::Prefetcher;
use crate::storage::{
    write_block_if_non_empty, DatasetAttributes, Storage, StorageCellLoader, StorageFactory,
};
use crate::{BlockwiseError, Result};

/// State shared by all blocks a worker processes.
pub struct WorkerContext<T> {
    cache: WorkerCache,
    prefetcher: Prefetcher,
    storage: Arc<dyn StorageFactory<T>>,
}

impl<T: Numeric> WorkerContext<T> {
    pub fn new<F: StorageFactory<T> + 'static>(storage: Arc<F>, config: &RunConfig) -> Result<Self> {
        Self::from_shared(storage, config)
    }

    pub fn from_shared(storage: Arc<dyn StorageFactory<T>>, config: &RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: WorkerCache::new(),
            prefetcher: Prefetcher::new(config.prefetch_threads)?,
            storage,
        })
    }

    pub fn cache(&self) -> &WorkerCache {
        &self.cache
    }

    pub fn prefetcher(&self) -> &Prefetcher {
        &self.prefetcher
    }
}

impl<T> std::fmt::Debug for WorkerContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("cache", &self.cache)
            .field("prefetcher", &self.prefetcher)
            .finish()
    }
}

/// What every block of a run shares: configuration and the filter plugin.
#[derive(Clone)]
pub struct BlockJob {
    pub config: RunConfig,
    pub filter: Arc<dyn PlaneFilter>,
}

impl BlockJob {
    pub fn new(config: RunConfig, filter: Arc<dyn PlaneFilter>) -> Self {
        Self { config, filter }
    }
}

impl std::fmt::Debug for BlockJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Result of a successfully processed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// At least one output block was written.
    Written { blocks: usize },
    /// Every value equals the background; nothing was written.
    SkippedEmpty,
}

/// The input dataset opened on a worker.
struct OpenedSource<T> {
    attributes: DatasetAttributes,
    view: VirtualArray<T>,
}

/// The block's interval grown by `radius` on every axis, clipped to `bounds`.
pub fn padded_interval(block: &GridBlock, radius: i64, bounds: &Interval) -> Result<Interval> {
    if block.ndim() != bounds.ndim() {
        return Err(GridError::RankMismatch(bounds.ndim(), block.ndim()).into());
    }
    let min = (0..block.ndim())
        .map(|d| bounds.min_at(d).max(block.offset[d] - radius))
        .collect();
    let max = (0..block.ndim())
        .map(|d| bounds.max_at(d).min(block.offset[d] + block.shape[d] - 1 + radius))
        .collect();
    Ok(Interval::new(min, max)?)
}

fn dataset_id(location: &str, dataset: &str) -> String {
    format!("{location}/{dataset}")
}

fn resource<R, F>(cache: &WorkerCache, kind: ResourceKind, id: &str, factory: F) -> Result<Arc<R>>
where
    R: Any + Send + Sync,
    F: FnOnce() -> Result<R>,
{
    let key = resource_key(kind, id);
    cache.get_or_create(&key, || {
        let resource = factory().map_err(|source| BlockwiseError::ResourceConstruction {
            key: key.clone(),
            source: Box::new(source),
        })?;
        tracing::info!(%key, "constructed worker resource");
        Ok(resource)
    })
}

/// Process one block. Errors abort the block and are returned unchanged;
/// there is no retry here.
pub fn process_block<T: Numeric>(
    context: &WorkerContext<T>,
    job: &BlockJob,
    block: &GridBlock,
) -> Result<BlockOutcome> {
    let config = &job.config;
    let local;
    let cache = match config.reuse {
        ResourceReuse::PerWorker => &context.cache,
        ResourceReuse::PerBlock => {
            local = WorkerCache::new();
            &local
        }
    };
    tracing::debug!(offset = ?block.offset, shape = ?block.shape, "processing block");

    let reader = resource(cache, ResourceKind::Reader, &config.input_location, || {
        context.storage.open_reader(&config.input_location)
    })?;
    let source_id = dataset_id(&config.input_location, &config.input_dataset);
    let source = resource(cache, ResourceKind::Source, &source_id, || {
        let attributes = reader.read_attributes(&config.input_dataset)?;
        let loader =
            StorageCellLoader::new(Arc::clone(reader.as_ref()), config.input_dataset.clone());
        let cells =
            CachedCells::new(attributes.interval()?, attributes.block_size.clone(), loader)?;
        Ok(OpenedSource {
            attributes,
            view: VirtualArray::from_source(cells),
        })
    })?;
    let bounds = source.attributes.interval()?;

    let padded = padded_interval(block, config.halo_radius(), &bounds)?;
    context
        .prefetcher
        .prefetch(&source.view, &padded, &block.shape)?;

    let target_id = dataset_id(&config.output_location, &config.output_dataset);
    let transformed = resource(cache, ResourceKind::Transformed, &target_id, || {
        let op = PlanarFilterOp::new(
            &source.view,
            Arc::clone(&job.filter),
            config.filter_parameters(),
        )?;
        let cell_size = config.cell_size_for(
            &source.attributes.dimensions,
            &source.attributes.block_size,
        );
        let cells = CachedCells::new(bounds.clone(), cell_size, op)?;
        Ok(VirtualArray::from_source(cells))
    })?;

    let interval = block.interval()?;
    let cropped = transformed.restrict_to_interval(&interval)?;
    context
        .prefetcher
        .prefetch(&cropped, &interval, &block.shape)?;
    let data = cropped.materialize(&interval)?;

    let background = T::zero();
    if data.is_uniform(&background) {
        tracing::trace!(grid_position = ?block.grid_position, "skipping empty block");
        return Ok(BlockOutcome::SkippedEmpty);
    }

    let writer: Arc<Arc<dyn Storage<T>>> =
        resource(cache, ResourceKind::Writer, &config.output_location, || {
            context.storage.open_writer(&config.output_location)
        })?;
    let out_block_size = config.output_block_size_for(&source.attributes.block_size);
    let written = write_output_blocks(
        &**writer,
        &config.output_dataset,
        block,
        &data,
        &out_block_size,
        &background,
    )?;
    tracing::debug!(grid_position = ?block.grid_position, written, "wrote block");
    Ok(if written == 0 {
        BlockOutcome::SkippedEmpty
    } else {
        BlockOutcome::Written { blocks: written }
    })
}

/// Split `data`, the evaluated `block`, into output blocks of
/// `out_block_size` and write the non-empty ones. Returns how many were
/// written.
fn write_output_blocks<T: Numeric>(
    storage: &dyn Storage<T>,
    dataset: &str,
    block: &GridBlock,
    data: &DenseArray<T>,
    out_block_size: &[i64],
    background: &T,
) -> Result<usize> {
    let mut written = 0;
    for sub in create(&block.shape, out_block_size, out_block_size)? {
        let offset: Vec<i64> = block
            .offset
            .iter()
            .zip(&sub.offset)
            .map(|(a, b)| a + b)
            .collect();
        let grid_position: Vec<i64> = block
            .grid_position
            .iter()
            .zip(&sub.grid_position)
            .map(|(a, b)| a + b)
            .collect();
        let mut piece = DenseArray::zeros(Interval::from_offset_shape(&offset, &sub.shape)?);
        data.copy_overlap_into(&mut piece)?;
        if write_block_if_non_empty(storage, dataset, &piece, &grid_position, background)? {
            written += 1;
        } else {
            tracing::trace!(?grid_position, "skipping empty output block");
        }
    }
    Ok(written)
}
