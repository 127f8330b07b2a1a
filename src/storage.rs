//! Storage collaborator contract and an in-memory implementation.
//!
//! Real deployments plug a chunked array format in behind [`Storage`] and
//! [`StorageFactory`]. [`MemoryStore`] keeps datasets as sparse maps of
//! blocks, which is enough to drive the executor in tests and examples.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use blockwise_view::{DenseArray, Interval, Numeric};

use crate::cells::CellLoader;
use crate::grid::create_simple;
use crate::{BlockwiseError, Result};

/// Shape metadata of a stored dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetAttributes {
    pub dimensions: Vec<i64>,
    pub block_size: Vec<i64>,
}

impl DatasetAttributes {
    pub fn new(dimensions: Vec<i64>, block_size: Vec<i64>) -> Result<Self> {
        // rejects empty, non-positive and mismatched vectors
        create_simple(&dimensions, &block_size)?;
        Ok(Self {
            dimensions,
            block_size,
        })
    }

    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    /// `[0, dimensions)`.
    pub fn interval(&self) -> Result<Interval> {
        Ok(Interval::from_dimensions(&self.dimensions)?)
    }

    /// Interval of the block at `grid_position`, clipped to the dimensions.
    pub fn block_interval(&self, grid_position: &[i64]) -> Result<Interval> {
        if grid_position.len() != self.ndim() {
            return Err(crate::GridError::RankMismatch(self.ndim(), grid_position.len()).into());
        }
        let min: Vec<i64> = grid_position
            .iter()
            .zip(&self.block_size)
            .map(|(&g, &s)| g * s)
            .collect();
        let max = min
            .iter()
            .zip(self.block_size.iter().zip(&self.dimensions))
            .map(|(&lo, (&s, &dim))| (lo + s).min(dim) - 1)
            .collect();
        Ok(Interval::new(min, max)?)
    }
}

/// One opened storage location.
pub trait Storage<T>: Send + Sync {
    fn read_attributes(&self, dataset: &str) -> Result<DatasetAttributes>;

    fn create_dataset(&self, dataset: &str, attributes: &DatasetAttributes) -> Result<()>;

    /// Read `interval` of `dataset` into an owned array placed at `interval`.
    fn read_region(&self, dataset: &str, interval: &Interval) -> Result<DenseArray<T>>;

    /// Store `data` as the block at `grid_position` of `dataset`.
    fn write_block(&self, dataset: &str, data: &DenseArray<T>, grid_position: &[i64])
        -> Result<()>;
}

/// Opens storage locations.
pub trait StorageFactory<T>: Send + Sync {
    fn open_reader(&self, location: &str) -> Result<Arc<dyn Storage<T>>>;

    fn open_writer(&self, location: &str) -> Result<Arc<dyn Storage<T>>>;
}

/// Write `data` unless every element equals `background`.
///
/// Returns whether a write happened.
pub fn write_block_if_non_empty<T: Numeric>(
    storage: &dyn Storage<T>,
    dataset: &str,
    data: &DenseArray<T>,
    grid_position: &[i64],
    background: &T,
) -> Result<bool> {
    if data.is_uniform(background) {
        return Ok(false);
    }
    storage.write_block(dataset, data, grid_position)?;
    Ok(true)
}

/// Loads cells of one dataset from storage.
pub struct StorageCellLoader<T> {
    storage: Arc<dyn Storage<T>>,
    dataset: String,
}

impl<T> StorageCellLoader<T> {
    pub fn new(storage: Arc<dyn Storage<T>>, dataset: impl Into<String>) -> Self {
        Self {
            storage,
            dataset: dataset.into(),
        }
    }
}

impl<T: Numeric> CellLoader<T> for StorageCellLoader<T> {
    fn load(&self, cell: &Interval) -> Result<DenseArray<T>> {
        self.storage.read_region(&self.dataset, cell)
    }
}

struct StoredDataset<T> {
    attributes: DatasetAttributes,
    blocks: HashMap<Vec<i64>, DenseArray<T>>,
}

/// Sparse in-memory storage location.
///
/// Blocks that were never written read as zero.
pub struct MemoryStore<T> {
    name: String,
    datasets: RwLock<HashMap<String, StoredDataset<T>>>,
    writes: AtomicUsize,
}

impl<T: Numeric> MemoryStore<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasets: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of [`Storage::write_block`] calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn missing(&self, dataset: &str) -> BlockwiseError {
        BlockwiseError::DatasetNotFound {
            location: self.name.clone(),
            dataset: dataset.to_string(),
        }
    }

    /// Create `dataset` and fill it block by block from `data`, which must
    /// cover `[0, attributes.dimensions)`. Uniformly zero blocks stay absent.
    pub fn insert_array(
        &self,
        dataset: &str,
        attributes: DatasetAttributes,
        data: &DenseArray<T>,
    ) -> Result<()> {
        let whole = attributes.interval()?;
        if data.interval() != &whole {
            return Err(BlockwiseError::Storage(format!(
                "array covers {} but dataset {dataset:?} covers {whole}",
                data.interval()
            )));
        }
        self.create_dataset(dataset, &attributes)?;
        for block in create_simple(&attributes.dimensions, &attributes.block_size)? {
            let interval = block.interval()?;
            let mut part = DenseArray::zeros(interval);
            data.copy_overlap_into(&mut part)?;
            write_block_if_non_empty(self, dataset, &part, &block.grid_position, &T::zero())?;
        }
        Ok(())
    }

    /// The stored block at `grid_position`, if any was written.
    pub fn read_block(&self, dataset: &str, grid_position: &[i64]) -> Result<Option<DenseArray<T>>> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let stored = datasets.get(dataset).ok_or_else(|| self.missing(dataset))?;
        Ok(stored.blocks.get(grid_position).cloned())
    }

    /// Number of stored blocks of `dataset`.
    pub fn block_count(&self, dataset: &str) -> Result<usize> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let stored = datasets.get(dataset).ok_or_else(|| self.missing(dataset))?;
        Ok(stored.blocks.len())
    }
}

impl<T: Numeric> Storage<T> for MemoryStore<T> {
    fn read_attributes(&self, dataset: &str) -> Result<DatasetAttributes> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        datasets
            .get(dataset)
            .map(|stored| stored.attributes.clone())
            .ok_or_else(|| self.missing(dataset))
    }

    fn create_dataset(&self, dataset: &str, attributes: &DatasetAttributes) -> Result<()> {
        let mut datasets = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
        datasets.insert(
            dataset.to_string(),
            StoredDataset {
                attributes: attributes.clone(),
                blocks: HashMap::new(),
            },
        );
        Ok(())
    }

    fn read_region(&self, dataset: &str, interval: &Interval) -> Result<DenseArray<T>> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let stored = datasets.get(dataset).ok_or_else(|| self.missing(dataset))?;
        let whole = stored.attributes.interval()?;
        if !whole.contains_interval(interval) {
            return Err(BlockwiseError::Storage(format!(
                "region {interval} outside of dataset {dataset:?} ({whole})"
            )));
        }

        let mut region = DenseArray::zeros(interval.clone());
        for block in stored.blocks.values() {
            if block.interval().intersect(interval).is_some() {
                block.copy_overlap_into(&mut region)?;
            }
        }
        Ok(region)
    }

    fn write_block(
        &self,
        dataset: &str,
        data: &DenseArray<T>,
        grid_position: &[i64],
    ) -> Result<()> {
        let mut datasets = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
        let stored = datasets
            .get_mut(dataset)
            .ok_or_else(|| self.missing(dataset))?;
        let expected = stored.attributes.block_interval(grid_position)?;
        if data.interval() != &expected {
            return Err(BlockwiseError::Storage(format!(
                "block at {grid_position:?} must cover {expected}, got {}",
                data.interval()
            )));
        }
        stored.blocks.insert(grid_position.to_vec(), data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Named in-memory locations with open counters.
pub struct MemoryStorageFactory<T> {
    locations: RwLock<HashMap<String, Arc<MemoryStore<T>>>>,
    opens: AtomicUsize,
}

impl<T: Numeric> Default for MemoryStorageFactory<T> {
    fn default() -> Self {
        Self {
            locations: RwLock::new(HashMap::new()),
            opens: AtomicUsize::new(0),
        }
    }
}

impl<T: Numeric> MemoryStorageFactory<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) location named `location`.
    pub fn create_location(&self, location: &str) -> Arc<MemoryStore<T>> {
        let mut locations = self.locations.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locations
                .entry(location.to_string())
                .or_insert_with(|| Arc::new(MemoryStore::new(location))),
        )
    }

    pub fn location(&self, location: &str) -> Option<Arc<MemoryStore<T>>> {
        let locations = self.locations.read().unwrap_or_else(PoisonError::into_inner);
        locations.get(location).cloned()
    }

    /// Number of reader and writer handles opened so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn open(&self, location: &str) -> Result<Arc<dyn Storage<T>>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let store = self
            .location(location)
            .ok_or_else(|| BlockwiseError::Storage(format!("unknown location {location:?}")))?;
        Ok(store)
    }
}

impl<T: Numeric> StorageFactory<T> for MemoryStorageFactory<T> {
    fn open_reader(&self, location: &str) -> Result<Arc<dyn Storage<T>>> {
        self.open(location)
    }

    fn open_writer(&self, location: &str) -> Result<Arc<dyn Storage<T>>> {
        self.open(location)
    }
}
