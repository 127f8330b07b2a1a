//! Run configuration.

use crate::filter::FilterParameters;
use crate::{BlockwiseError, Result, BASE_HALO_RADIUS, DEFAULT_CELL_SIZE, DEFAULT_CLAMP_RANGE};

/// How long worker resources live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceReuse {
    /// Construct each resource once per worker and share it across blocks.
    #[default]
    PerWorker,
    /// Rebuild every resource for every block.
    PerBlock,
}

/// Everything a run needs besides the block list.
///
/// # Example
///
/// ```
/// use blockwise::RunConfig;
///
/// let config = RunConfig::new("/data/in", "raw/s2", "/data/out", "filtered/s2", 2);
/// assert_eq!(config.halo_radius(), 256);
/// assert_eq!(config.cell_size_for(&[512, 512, 64], &[128, 128, 64]), vec![256, 256, 32]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input_location: String,
    pub input_dataset: String,
    pub output_location: String,
    pub output_dataset: String,
    /// Scale level; halves the halo radius per level.
    pub scale_index: u32,
    /// Cell size of the cached transformed view.
    pub cell_size: Option<Vec<i64>>,
    /// Storage block size of the output dataset; `None` keeps the input's.
    pub output_block_size: Option<Vec<i64>>,
    /// Compute block size, a multiple of the output block size; `None` uses
    /// the output block size.
    pub grid_block_size: Option<Vec<i64>>,
    /// Worker-local prefetch pool size; `None` uses rayon's default.
    pub prefetch_threads: Option<usize>,
    pub reuse: ResourceReuse,
    pub clamp_range: (f64, f64),
}

impl RunConfig {
    pub fn new(
        input_location: impl Into<String>,
        input_dataset: impl Into<String>,
        output_location: impl Into<String>,
        output_dataset: impl Into<String>,
        scale_index: u32,
    ) -> Self {
        Self {
            input_location: input_location.into(),
            input_dataset: input_dataset.into(),
            output_location: output_location.into(),
            output_dataset: output_dataset.into(),
            scale_index,
            cell_size: None,
            output_block_size: None,
            grid_block_size: None,
            prefetch_threads: None,
            reuse: ResourceReuse::default(),
            clamp_range: DEFAULT_CLAMP_RANGE,
        }
    }

    pub fn with_cell_size(mut self, cell_size: Vec<i64>) -> Self {
        self.cell_size = Some(cell_size);
        self
    }

    pub fn with_output_block_size(mut self, block_size: Vec<i64>) -> Self {
        self.output_block_size = Some(block_size);
        self
    }

    pub fn with_grid_block_size(mut self, block_size: Vec<i64>) -> Self {
        self.grid_block_size = Some(block_size);
        self
    }

    pub fn with_prefetch_threads(mut self, threads: usize) -> Self {
        self.prefetch_threads = Some(threads);
        self
    }

    pub fn with_reuse(mut self, reuse: ResourceReuse) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn with_clamp_range(mut self, min: f64, max: f64) -> Self {
        self.clamp_range = (min, max);
        self
    }

    /// `round(1023 * 2^-scale_index)`.
    pub fn halo_radius(&self) -> i64 {
        let exponent = i32::try_from(self.scale_index).unwrap_or(i32::MAX);
        (BASE_HALO_RADIUS * 2f64.powi(-exponent)).round() as i64
    }

    pub fn filter_parameters(&self) -> FilterParameters {
        FilterParameters::new(self.halo_radius(), self.clamp_range.0, self.clamp_range.1)
    }

    /// Cell size for a dataset of `dimensions` stored in `block_size` blocks.
    pub fn cell_size_for(&self, dimensions: &[i64], block_size: &[i64]) -> Vec<i64> {
        match &self.cell_size {
            Some(cell_size) => cell_size.clone(),
            None if dimensions.len() == DEFAULT_CELL_SIZE.len() => DEFAULT_CELL_SIZE.to_vec(),
            None => block_size.to_vec(),
        }
    }

    /// Output storage block size for an input stored in `input_block_size`.
    pub fn output_block_size_for(&self, input_block_size: &[i64]) -> Vec<i64> {
        self.output_block_size
            .clone()
            .unwrap_or_else(|| input_block_size.to_vec())
    }

    /// Compute block size for output blocks of `output_block_size`.
    pub fn grid_block_size_for(&self, output_block_size: &[i64]) -> Vec<i64> {
        self.grid_block_size
            .clone()
            .unwrap_or_else(|| output_block_size.to_vec())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("input location", &self.input_location),
            ("input dataset", &self.input_dataset),
            ("output location", &self.output_location),
            ("output dataset", &self.output_dataset),
        ] {
            if value.is_empty() {
                return Err(BlockwiseError::InvalidConfig(format!("{name} is empty")));
            }
        }
        for (name, sizes) in [
            ("cell size", &self.cell_size),
            ("output block size", &self.output_block_size),
            ("grid block size", &self.grid_block_size),
        ] {
            if let Some(sizes) = sizes {
                if sizes.is_empty() || sizes.iter().any(|&s| s <= 0) {
                    return Err(BlockwiseError::InvalidConfig(format!(
                        "{name} must be positive, got {sizes:?}"
                    )));
                }
            }
        }
        if self.prefetch_threads == Some(0) {
            return Err(BlockwiseError::InvalidConfig(
                "prefetch pool needs at least one thread".into(),
            ));
        }
        self.filter_parameters().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(scale: u32) -> RunConfig {
        RunConfig::new("in", "raw", "out", "filtered", scale)
    }

    #[test]
    fn test_halo_radius_per_scale() {
        assert_eq!(config(0).halo_radius(), 1023);
        assert_eq!(config(1).halo_radius(), 512);
        assert_eq!(config(4).halo_radius(), 64);
        assert_eq!(config(10).halo_radius(), 1);
        assert_eq!(config(12).halo_radius(), 0);
    }

    #[test]
    fn test_filter_parameters() {
        let parameters = config(3).filter_parameters();
        assert_eq!(parameters.radius, 128);
        assert_eq!((parameters.clamp_min, parameters.clamp_max), (0.0, 65535.0));
        assert_eq!(parameters.contrast.bins, 10);
    }

    #[test]
    fn test_cell_size_defaults() {
        let c = config(0);
        assert_eq!(c.cell_size_for(&[10, 10, 10], &[5, 5, 5]), vec![256, 256, 32]);
        assert_eq!(c.cell_size_for(&[10, 10], &[5, 4]), vec![5, 4]);
        let c = c.with_cell_size(vec![8, 8]);
        assert_eq!(c.cell_size_for(&[10, 10, 10], &[5, 5, 5]), vec![8, 8]);
    }

    #[test]
    fn test_block_size_defaults() {
        let c = config(0);
        assert_eq!(c.output_block_size_for(&[64, 64]), vec![64, 64]);
        assert_eq!(c.grid_block_size_for(&[64, 64]), vec![64, 64]);
        let c = c
            .with_output_block_size(vec![32, 32])
            .with_grid_block_size(vec![128, 64]);
        assert_eq!(c.output_block_size_for(&[64, 64]), vec![32, 32]);
        assert_eq!(c.grid_block_size_for(&[32, 32]), vec![128, 64]);
    }

    #[test]
    fn test_validate() {
        assert!(config(0).validate().is_ok());
        assert!(RunConfig::new("", "raw", "out", "f", 0).validate().is_err());
        assert!(config(0).with_cell_size(vec![4, 0]).validate().is_err());
        assert!(config(0).with_prefetch_threads(0).validate().is_err());
        assert!(config(0).with_grid_block_size(vec![8, -8]).validate().is_err());
        assert!(config(0).with_output_block_size(vec![]).validate().is_err());
        assert!(config(0).with_clamp_range(5.0, 1.0).validate().is_err());
        assert!(config(0)
            .with_reuse(ResourceReuse::PerBlock)
            .with_prefetch_threads(2)
            .validate()
            .is_ok());
    }
}
