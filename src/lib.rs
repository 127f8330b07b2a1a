//! Out-of-core, block-parallel processing of large N-dimensional arrays.
//!
//! The array is partitioned into blocks by the [`grid`] module. Each block is
//! driven through a lazily evaluated transform by [`process_block`], which
//! reuses expensive per-worker resources through a [`WorkerContext`],
//! prefetches the input region in parallel, evaluates the block and writes
//! it only if it holds anything other than the background value.
//!
//! # Core Types
//!
//! - [`GridBlock`]: one unit of work (offset, clipped shape, output grid position)
//! - [`WorkerCache`]: keyed, construct-once cache of worker resources
//! - [`CachedCells`]: lazily loaded, cell-cached [`Source`] for views
//! - [`WorkerContext`] / [`BlockJob`]: explicit state threaded into [`process_block`]
//! - [`Storage`] / [`StorageFactory`]: storage collaborator contract
//! - [`PlaneFilter`]: per-plane transform plugin contract
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use blockwise::{
//!     prepare, run_local, BlockJob, DatasetAttributes, DenseArray, Interval,
//!     MemoryStorageFactory, MemoryStore, PlaneFilter, RunConfig, WorkerContext,
//! };
//!
//! struct Identity;
//! impl PlaneFilter for Identity {
//!     fn apply(&self, _: &mut blockwise::Plane, _: &blockwise::FilterParameters) -> blockwise::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let factory = Arc::new(MemoryStorageFactory::<u16>::new());
//! let input = factory.create_location("in");
//! factory.create_location("out");
//! let attributes = DatasetAttributes::new(vec![16, 16], vec![8, 8]).unwrap();
//! let data = DenseArray::from_fn(Interval::from_dimensions(&[16, 16]).unwrap(), |p| {
//!     if p[0] < 8 { 0 } else { 7 }
//! });
//! input.insert_array("raw", attributes, &data).unwrap();
//!
//! let config = RunConfig::new("in", "raw", "out", "filtered", 4).with_cell_size(vec![8, 8]);
//! let blocks = prepare(factory.as_ref(), &config).unwrap();
//! let context = WorkerContext::new(factory.clone(), &config).unwrap();
//! let job = BlockJob::new(config, Arc::new(Identity));
//! let summary = run_local(&context, &job, &blocks).unwrap();
//! assert_eq!(summary.written + summary.skipped, 4);
//! ```

pub mod cache;
pub mod cells;
pub mod config;
pub mod driver;
pub mod executor;
pub mod filter;
pub mod grid;
pub mod prefetch;
pub mod storage;
pub mod telemetry;

// ============================================================================
// Partitioning
// ============================================================================
pub use grid::{create, create_offsets, create_simple, grid_cell, GridBlock, GridError};

// ============================================================================
// Worker resources
// ============================================================================
pub use cache::{resource_key, OnceMap, ResourceKind, WorkerCache};
pub use cells::{CachedCells, CellLoader};
pub use prefetch::Prefetcher;

// ============================================================================
// Execution
// ============================================================================
pub use config::{ResourceReuse, RunConfig};
pub use driver::{prepare, run_local, RunSummary};
pub use executor::{padded_interval, process_block, BlockJob, BlockOutcome, WorkerContext};

// ============================================================================
// Collaborators
// ============================================================================
pub use filter::{ContrastLimits, FilterParameters, PlanarFilterOp, Plane, PlaneFilter};
pub use storage::{
    write_block_if_non_empty, DatasetAttributes, MemoryStorageFactory, MemoryStore, Storage,
    StorageCellLoader, StorageFactory,
};

// ============================================================================
// Views
// ============================================================================
pub use blockwise_view::{
    BinaryOp, DenseArray, Extension, Interval, Numeric, Source, ViewError, VirtualArray,
};

// ============================================================================
// Constants
// ============================================================================

/// Halo radius at scale index 0; halved with every scale level.
pub const BASE_HALO_RADIUS: f64 = 1023.0;

/// Default cell size of the cached transformed view for rank-3 data.
pub const DEFAULT_CELL_SIZE: [i64; 3] = [256, 256, 32];

/// Default output value range of the transform.
pub const DEFAULT_CLAMP_RANGE: (f64, f64) = (0.0, 65535.0);

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while partitioning, caching, evaluating or writing.
#[derive(Debug, thiserror::Error)]
pub enum BlockwiseError {
    /// Malformed dimensions or block sizes.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A view could not be built or evaluated.
    #[error(transparent)]
    View(#[from] ViewError),

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The requested dataset does not exist.
    #[error("dataset {dataset:?} not found at {location:?}")]
    DatasetNotFound { location: String, dataset: String },

    /// A worker resource could not be constructed.
    #[error("failed to construct worker resource {key:?}: {source}")]
    ResourceConstruction {
        key: String,
        #[source]
        source: Box<BlockwiseError>,
    },

    /// A cache key already holds a resource of a different type.
    #[error("worker resource {key:?} has a different type")]
    CacheTypeMismatch { key: String },

    /// The worker-local prefetch pool could not be built.
    #[error("failed to build prefetch pool: {0}")]
    ThreadPool(String),

    /// The plane filter plugin failed.
    #[error("filter failed: {0}")]
    Filter(String),

    /// The run configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for blockwise operations.
pub type Result<T> = std::result::Result<T, BlockwiseError>;
