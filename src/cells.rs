//! Lazily loaded, cell-cached sources.
//!
//! A [`CachedCells`] covers a bounded interval with a regular grid of cells.
//! The first read that touches a cell loads the whole cell through its
//! [`CellLoader`]; every later read of that cell is served from memory.
//! Cells are never evicted, so a `CachedCells` shared through the worker
//! cache keeps every cell it has loaded for the lifetime of the worker.

use std::fmt;
use std::sync::Arc;

use blockwise_view::{DenseArray, Interval, Numeric, Source, ViewError};

use crate::cache::OnceMap;
use crate::grid::grid_cell;
use crate::{BlockwiseError, Result};

/// Produces the values of one cell.
///
/// `cell` is already clipped to the bounds of the owning [`CachedCells`];
/// the returned array must cover exactly that interval.
pub trait CellLoader<T>: Send + Sync {
    fn load(&self, cell: &Interval) -> Result<DenseArray<T>>;
}

impl<T, F> CellLoader<T> for F
where
    F: Fn(&Interval) -> Result<DenseArray<T>> + Send + Sync,
{
    fn load(&self, cell: &Interval) -> Result<DenseArray<T>> {
        self(cell)
    }
}

/// A bounded [`Source`] whose values are loaded one cell at a time.
pub struct CachedCells<T> {
    bounds: Interval,
    cell_size: Vec<i64>,
    loader: Box<dyn CellLoader<T>>,
    cells: OnceMap<Vec<i64>, Arc<DenseArray<T>>>,
}

impl<T: Numeric> CachedCells<T> {
    pub fn new(
        bounds: Interval,
        cell_size: Vec<i64>,
        loader: impl CellLoader<T> + 'static,
    ) -> Result<Self> {
        // validates rank and positivity
        grid_cell(bounds.min(), bounds.min(), &cell_size)?;
        Ok(Self {
            bounds,
            cell_size,
            loader: Box::new(loader),
            cells: OnceMap::new(),
        })
    }

    pub fn cell_size(&self) -> &[i64] {
        &self.cell_size
    }

    /// Number of cells loaded so far.
    pub fn loaded_cells(&self) -> usize {
        self.cells.len()
    }

    /// Interval of the cell at grid coordinate `cell`, clipped to the bounds.
    pub fn cell_interval(&self, cell: &[i64]) -> Result<Interval> {
        let min: Vec<i64> = cell
            .iter()
            .zip(self.bounds.min().iter().zip(&self.cell_size))
            .map(|(&c, (&m, &s))| m + c * s)
            .collect();
        let max = min
            .iter()
            .zip(self.bounds.max().iter().zip(&self.cell_size))
            .map(|(&lo, (&hi, &s))| (lo + s - 1).min(hi))
            .collect();
        Ok(Interval::new(min, max)?)
    }

    fn cell_at(&self, position: &[i64]) -> Result<Arc<DenseArray<T>>> {
        let cell = grid_cell(position, self.bounds.min(), &self.cell_size)?;
        self.cells.get_or_try_insert_with(&cell, || {
            let interval = self.cell_interval(&cell)?;
            let data = self.loader.load(&interval)?;
            if data.interval() != &interval {
                return Err(BlockwiseError::Storage(format!(
                    "cell loader returned {} for cell {}",
                    data.interval(),
                    interval
                )));
            }
            Ok(Arc::new(data))
        })
    }
}

impl<T: Numeric> Source<T> for CachedCells<T> {
    fn bounds(&self) -> &Interval {
        &self.bounds
    }

    fn read(&self, position: &[i64]) -> blockwise_view::Result<T> {
        if !self.bounds.contains(position) {
            return Err(ViewError::OutOfBounds {
                position: position.to_vec(),
                interval: self.bounds.clone(),
            });
        }
        let cell = self.cell_at(position).map_err(|e| match e {
            BlockwiseError::View(inner) => inner,
            other => ViewError::Source(Box::new(other)),
        })?;
        cell.get(position)
    }
}

impl<T> fmt::Debug for CachedCells<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedCells")
            .field("bounds", &self.bounds)
            .field("cell_size", &self.cell_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use blockwise_view::VirtualArray;

    fn counting_cells(calls: Arc<AtomicUsize>) -> CachedCells<i32> {
        let bounds = Interval::from_dimensions(&[10, 6]).unwrap();
        CachedCells::new(bounds, vec![4, 4], move |cell: &Interval| -> Result<DenseArray<i32>> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(DenseArray::from_fn(cell.clone(), |p| (p[0] + 100 * p[1]) as i32))
        })
        .unwrap()
    }

    #[test]
    fn test_cells_load_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cells = counting_cells(Arc::clone(&calls));

        assert_eq!(cells.read(&[1, 1]).unwrap(), 101);
        assert_eq!(cells.read(&[3, 3]).unwrap(), 303);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cells.read(&[9, 5]).unwrap(), 509);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cells.loaded_cells(), 2);
    }

    #[test]
    fn test_edge_cells_are_clipped() {
        let cells = counting_cells(Arc::new(AtomicUsize::new(0)));
        let edge = cells.cell_interval(&[2, 1]).unwrap();
        assert_eq!(edge, Interval::new(vec![8, 4], vec![9, 5]).unwrap());
    }

    #[test]
    fn test_read_out_of_bounds() {
        let cells = counting_cells(Arc::new(AtomicUsize::new(0)));
        assert!(matches!(
            cells.read(&[10, 0]),
            Err(ViewError::OutOfBounds { .. })
        ));
        assert_eq!(cells.loaded_cells(), 0);
    }

    #[test]
    fn test_loader_failure_surfaces_and_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let bounds = Interval::from_dimensions(&[4]).unwrap();
        let cells = CachedCells::new(bounds, vec![4], move |cell: &Interval| -> Result<DenseArray<f32>> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(BlockwiseError::Storage("transient".into()));
            }
            Ok(DenseArray::filled(cell.clone(), 7.0f32))
        })
        .unwrap();

        assert!(matches!(cells.read(&[0]), Err(ViewError::Source(_))));
        assert_eq!(cells.read(&[0]).unwrap(), 7.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wrong_cell_shape_rejected() {
        let bounds = Interval::from_dimensions(&[4]).unwrap();
        let cells = CachedCells::new(bounds, vec![2], |_: &Interval| -> Result<DenseArray<u8>> {
            Ok(DenseArray::filled(Interval::from_dimensions(&[4]).unwrap(), 0u8))
        })
        .unwrap();
        assert!(cells.read(&[0]).is_err());
    }

    #[test]
    fn test_invalid_cell_size() {
        let bounds = Interval::from_dimensions(&[4, 4]).unwrap();
        let loader = |cell: &Interval| -> Result<DenseArray<u8>> {
            Ok(DenseArray::filled(cell.clone(), 0u8))
        };
        assert!(CachedCells::new(bounds.clone(), vec![2], loader).is_err());
        assert!(CachedCells::new(bounds, vec![2, 0], loader).is_err());
    }

    #[test]
    fn test_view_over_cells() {
        let cells = counting_cells(Arc::new(AtomicUsize::new(0)));
        let view = VirtualArray::from_source(cells).translate(&[1, 0]).unwrap();
        assert_eq!(view.get(&[5, 2]).unwrap(), 204);
    }
}
