//! Bulk-synchronous prefetching of view regions.
//!
//! Prefetching evaluates every position of a region once, tile by tile, on
//! a worker-local pool and waits for all tiles. For views backed by
//! [`crate::CachedCells`] this loads every touched cell up front, so the
//! single-threaded pass that follows only hits memory.

use blockwise_view::{Interval, Numeric, VirtualArray};

use crate::grid::create_offsets;
use crate::Result;

#[cfg(feature = "parallel")]
use crate::BlockwiseError;

/// Worker-local prefetch pool.
pub struct Prefetcher {
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

impl Prefetcher {
    /// Build a pool of `threads` workers, or rayon's default size for `None`.
    #[cfg(feature = "parallel")]
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("blockwise-prefetch-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n.max(1));
        }
        let pool = builder
            .build()
            .map_err(|err| BlockwiseError::ThreadPool(err.to_string()))?;
        Ok(Self { pool })
    }

    /// Without the `parallel` feature tiles are evaluated on the caller.
    #[cfg(not(feature = "parallel"))]
    pub fn new(_threads: Option<usize>) -> Result<Self> {
        Ok(Self {})
    }

    pub fn num_threads(&self) -> usize {
        #[cfg(feature = "parallel")]
        {
            self.pool.current_num_threads()
        }
        #[cfg(not(feature = "parallel"))]
        {
            1
        }
    }

    /// Evaluate `view` over `interval`, split into tiles of `spacing`.
    ///
    /// Returns the number of tiles once all of them are done. The first
    /// failing read aborts the prefetch.
    pub fn prefetch<T: Numeric>(
        &self,
        view: &VirtualArray<T>,
        interval: &Interval,
        spacing: &[i64],
    ) -> Result<usize> {
        let tiles = tiles(interval, spacing)?;
        tracing::debug!(%interval, tiles = tiles.len(), "prefetching");

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.pool
                .install(|| tiles.par_iter().try_for_each(|tile| touch(view, tile)))?;
        }
        #[cfg(not(feature = "parallel"))]
        {
            tiles.iter().try_for_each(|tile| touch(view, tile))?;
        }

        Ok(tiles.len())
    }
}

impl std::fmt::Debug for Prefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prefetcher")
            .field("threads", &self.num_threads())
            .finish()
    }
}

fn tiles(interval: &Interval, spacing: &[i64]) -> Result<Vec<Interval>> {
    create_offsets(interval, spacing)?
        .into_iter()
        .map(|min| {
            let max = min
                .iter()
                .zip(spacing.iter().zip(interval.max()))
                .map(|(&lo, (&s, &hi))| (lo + s - 1).min(hi))
                .collect();
            Ok(Interval::new(min, max)?)
        })
        .collect()
}

fn touch<T: Numeric>(view: &VirtualArray<T>, tile: &Interval) -> Result<()> {
    for p in tile.positions() {
        view.get(&p)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::CachedCells;
    use blockwise_view::DenseArray;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_tiles_cover_interval() {
        let interval = Interval::new(vec![1, 1], vec![6, 4]).unwrap();
        let tiles = tiles(&interval, &[4, 3]).unwrap();
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[0], Interval::new(vec![1, 1], vec![4, 3]).unwrap());
        assert_eq!(tiles[3], Interval::new(vec![5, 4], vec![6, 4]).unwrap());
        let covered: usize = tiles.iter().map(Interval::len).sum();
        assert_eq!(covered, interval.len());
    }

    #[test]
    fn test_prefetch_loads_every_cell_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let bounds = Interval::from_dimensions(&[16, 16]).unwrap();
        let cells = CachedCells::new(
            bounds.clone(),
            vec![4, 4],
            move |cell: &Interval| -> Result<DenseArray<f64>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(DenseArray::filled(cell.clone(), 1.0))
            },
        )
        .unwrap();
        let view = VirtualArray::from_source(cells);

        let prefetcher = Prefetcher::new(Some(4)).unwrap();
        let region = Interval::new(vec![0, 0], vec![7, 11]).unwrap();
        let tiles = prefetcher.prefetch(&view, &region, &[3, 5]).unwrap();
        assert_eq!(tiles, 9);
        // 2 x 3 cells
        assert_eq!(loads.load(Ordering::SeqCst), 6);

        prefetcher.prefetch(&view, &bounds, &[8, 8]).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_prefetch_surfaces_read_errors() {
        let view = VirtualArray::from_source(DenseArray::<u8>::zeros(
            Interval::from_dimensions(&[4]).unwrap(),
        ));
        let prefetcher = Prefetcher::new(None).unwrap();
        let outside = Interval::new(vec![2], vec![6]).unwrap();
        assert!(prefetcher.prefetch(&view, &outside, &[2]).is_err());
    }
}
