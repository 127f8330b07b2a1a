//! Grid partitioning of N-dimensional arrays into blocks.
//!
//! Two spacings are involved. The input grid decides where blocks start and
//! how large they are; the output grid only numbers them. With an input
//! block size that is an integer multiple of the output block size, a block
//! starting at `offset` lands at `offset / out_block_size` on the output grid
//! and covers a whole number of output cells.
//!
//! Enumeration is a mixed-radix odometer with axis 0 fastest: advance
//! `offset[0]` by one block, and on overflow reset it and carry into the
//! next axis.

use blockwise_view::Interval;
use thiserror::Error;

/// Errors raised for malformed partitioning inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("dimensions must have at least one axis")]
    EmptyDimensions,

    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    #[error("dimension {axis} must be positive, got {value}")]
    NonPositiveDimension { axis: usize, value: i64 },

    #[error("block size on axis {axis} must be positive, got {value}")]
    NonPositiveBlockSize { axis: usize, value: i64 },
}

/// One unit of work.
///
/// `offset` and `shape` are world coordinates on the input grid; `shape` is
/// clipped at the upper array boundary. `grid_position` is the block's
/// coordinate on the output grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridBlock {
    pub offset: Vec<i64>,
    pub shape: Vec<i64>,
    pub grid_position: Vec<i64>,
}

impl GridBlock {
    pub fn ndim(&self) -> usize {
        self.offset.len()
    }

    /// Number of elements covered by the block.
    pub fn len(&self) -> usize {
        self.shape.iter().map(|&s| s as usize).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The block's interval `[offset, offset + shape)`.
    pub fn interval(&self) -> blockwise_view::Result<Interval> {
        Interval::from_offset_shape(&self.offset, &self.shape)
    }
}

fn validate(dimensions: &[i64], block_sizes: &[&[i64]]) -> Result<(), GridError> {
    if dimensions.is_empty() {
        return Err(GridError::EmptyDimensions);
    }
    if let Some((axis, &value)) = dimensions.iter().enumerate().find(|&(_, &v)| v <= 0) {
        return Err(GridError::NonPositiveDimension { axis, value });
    }
    for sizes in block_sizes {
        validate_spacing(dimensions.len(), sizes)?;
    }
    Ok(())
}

fn validate_spacing(rank: usize, spacing: &[i64]) -> Result<(), GridError> {
    if spacing.len() != rank {
        return Err(GridError::RankMismatch(rank, spacing.len()));
    }
    if let Some((axis, &value)) = spacing.iter().enumerate().find(|&(_, &v)| v <= 0) {
        return Err(GridError::NonPositiveBlockSize { axis, value });
    }
    Ok(())
}

/// Partition `[0, dimensions)` into blocks of `grid_block_size`, numbered on
/// an output grid of `out_block_size`.
///
/// `grid_block_size` is assumed to be an integer multiple of
/// `out_block_size` on every axis. This is not enforced; when it does not
/// hold, `grid_position` is plain integer division and will not align with
/// the output grid.
///
/// # Example
///
/// ```
/// use blockwise::grid::create;
///
/// let blocks = create(&[10, 10], &[4, 4], &[2, 2]).unwrap();
/// assert_eq!(blocks.len(), 9);
/// assert_eq!(blocks[5].offset, vec![8, 4]);
/// assert_eq!(blocks[5].shape, vec![2, 4]);
/// assert_eq!(blocks[5].grid_position, vec![4, 2]);
/// ```
pub fn create(
    dimensions: &[i64],
    grid_block_size: &[i64],
    out_block_size: &[i64],
) -> Result<Vec<GridBlock>, GridError> {
    validate(dimensions, &[grid_block_size, out_block_size])?;

    if grid_block_size
        .iter()
        .zip(out_block_size)
        .any(|(&g, &o)| g % o != 0)
    {
        tracing::warn!(
            ?grid_block_size,
            ?out_block_size,
            "grid block size is not a multiple of the output block size"
        );
    }

    let n = dimensions.len();
    let num_blocks: usize = dimensions
        .iter()
        .zip(grid_block_size)
        .map(|(&dim, &size)| ((dim + size - 1) / size) as usize)
        .product();
    let mut blocks = Vec::with_capacity(num_blocks);

    let mut offset = vec![0i64; n];
    loop {
        let shape = offset
            .iter()
            .zip(dimensions.iter().zip(grid_block_size))
            .map(|(&o, (&dim, &size))| size.min(dim - o))
            .collect();
        let grid_position = offset
            .iter()
            .zip(out_block_size)
            .map(|(&o, &size)| o / size)
            .collect();
        blocks.push(GridBlock {
            offset: offset.clone(),
            shape,
            grid_position,
        });

        if !advance(&mut offset, grid_block_size, |_| 0, |d, o| o < dimensions[d]) {
            break;
        }
    }

    Ok(blocks)
}

/// [`create`] with identical input and output spacing.
pub fn create_simple(dimensions: &[i64], block_size: &[i64]) -> Result<Vec<GridBlock>, GridError> {
    create(dimensions, block_size, block_size)
}

/// World offsets tiling `interval` at `spacing`, axis 0 fastest, starting
/// from `interval.min()`.
pub fn create_offsets(interval: &Interval, spacing: &[i64]) -> Result<Vec<Vec<i64>>, GridError> {
    validate_spacing(interval.ndim(), spacing)?;

    let mut offsets = Vec::new();
    let mut offset = interval.min().to_vec();
    loop {
        offsets.push(offset.clone());
        if !advance(
            &mut offset,
            spacing,
            |d| interval.min_at(d),
            |d, o| o <= interval.max_at(d),
        ) {
            break;
        }
    }
    Ok(offsets)
}

/// Grid coordinate of a world `offset` for a grid starting at `min` with
/// the given `spacing`.
pub fn grid_cell(offset: &[i64], min: &[i64], spacing: &[i64]) -> Result<Vec<i64>, GridError> {
    if min.len() != offset.len() {
        return Err(GridError::RankMismatch(offset.len(), min.len()));
    }
    validate_spacing(offset.len(), spacing)?;
    Ok(offset
        .iter()
        .zip(min.iter().zip(spacing))
        .map(|(&o, (&m, &s))| (o - m) / s)
        .collect())
}

/// One odometer step. Returns `false` once every axis has wrapped.
fn advance(
    offset: &mut [i64],
    spacing: &[i64],
    start: impl Fn(usize) -> i64,
    in_range: impl Fn(usize, i64) -> bool,
) -> bool {
    for d in 0..offset.len() {
        offset[d] += spacing[d];
        if in_range(d, offset[d]) {
            return true;
        }
        offset[d] = start(d);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every position of `[0, dimensions)` is covered by exactly one block.
    fn verify_coverage(dimensions: &[i64], blocks: &[GridBlock]) -> bool {
        let whole = Interval::from_dimensions(dimensions).unwrap();
        let mut seen = vec![0u8; whole.len()];
        let strides: Vec<usize> = dimensions
            .iter()
            .scan(1usize, |acc, &d| {
                let s = *acc;
                *acc *= d as usize;
                Some(s)
            })
            .collect();
        for block in blocks {
            for p in block.interval().unwrap().positions() {
                if !whole.contains(&p) {
                    return false;
                }
                let idx: usize = p.iter().zip(&strides).map(|(&x, &s)| x as usize * s).sum();
                seen[idx] += 1;
            }
        }
        seen.iter().all(|&c| c == 1)
    }

    #[test]
    fn test_ten_by_ten_scenario() {
        let blocks = create_simple(&[10, 10], &[4, 4]).unwrap();
        let offsets: Vec<_> = blocks.iter().map(|b| b.offset.clone()).collect();
        assert_eq!(
            offsets,
            vec![
                vec![0, 0],
                vec![4, 0],
                vec![8, 0],
                vec![0, 4],
                vec![4, 4],
                vec![8, 4],
                vec![0, 8],
                vec![4, 8],
                vec![8, 8],
            ]
        );
        for block in &blocks {
            for d in 0..2 {
                let expected = if block.offset[d] == 8 { 2 } else { 4 };
                assert_eq!(block.shape[d], expected);
                assert_eq!(block.grid_position[d], block.offset[d] / 4);
            }
        }
        assert_eq!(blocks[5].grid_position, vec![2, 1]);
        assert!(verify_coverage(&[10, 10], &blocks));
    }

    #[test]
    fn test_distinct_output_spacing() {
        let blocks = create(&[12, 5], &[6, 5], &[3, 5]).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].offset, vec![6, 0]);
        assert_eq!(blocks[1].grid_position, vec![2, 0]);
    }

    #[test]
    fn test_block_larger_than_array() {
        let blocks = create_simple(&[3, 2, 5], &[8, 8, 8]).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].shape, vec![3, 2, 5]);
        assert_eq!(blocks[0].len(), 30);
    }

    #[test]
    fn test_coverage_exhaustive() {
        for dims in [[1i64, 1], [7, 3], [10, 10], [17, 5]] {
            for size in [[1i64, 1], [2, 3], [4, 4], [7, 10]] {
                let blocks = create_simple(&dims, &size).unwrap();
                assert!(
                    verify_coverage(&dims, &blocks),
                    "coverage failed for dims={:?}, size={:?}",
                    dims,
                    size
                );
                for block in &blocks {
                    for d in 0..2 {
                        assert!(block.shape[d] <= size[d]);
                        assert!(block.offset[d] + block.shape[d] <= dims[d]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_error_cases() {
        assert_eq!(create_simple(&[], &[]), Err(GridError::EmptyDimensions));
        assert_eq!(
            create_simple(&[4, 4], &[2]),
            Err(GridError::RankMismatch(2, 1))
        );
        assert_eq!(
            create_simple(&[4, 0], &[2, 2]),
            Err(GridError::NonPositiveDimension { axis: 1, value: 0 })
        );
        assert_eq!(
            create(&[4, 4], &[2, 2], &[2, -1]),
            Err(GridError::NonPositiveBlockSize { axis: 1, value: -1 })
        );
    }

    #[test]
    fn test_create_offsets() {
        let interval = Interval::new(vec![2, 10], vec![6, 12]).unwrap();
        let offsets = create_offsets(&interval, &[3, 2]).unwrap();
        assert_eq!(
            offsets,
            vec![vec![2, 10], vec![5, 10], vec![2, 12], vec![5, 12]]
        );
    }

    #[test]
    fn test_grid_cell() {
        assert_eq!(grid_cell(&[8, 4], &[0, 0], &[4, 4]).unwrap(), vec![2, 1]);
        assert_eq!(grid_cell(&[5, 12], &[2, 10], &[3, 2]).unwrap(), vec![1, 1]);
        assert!(grid_cell(&[1], &[0, 0], &[1]).is_err());
    }
}
