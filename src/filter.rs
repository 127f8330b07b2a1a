//! Per-plane filter plugins and the adapter that runs them over cells.
//!
//! A [`PlaneFilter`] sees one 2-D `f32` plane at a time. [`PlanarFilterOp`]
//! is the [`CellLoader`] that feeds it: it reads a cell of the zero-extended
//! source padded by the filter radius on the two plane axes, filters every
//! plane, crops the padding away and clamps into the output value range.

use std::fmt;
use std::sync::Arc;

use blockwise_view::{DenseArray, Extension, Interval, Numeric, VirtualArray};

use crate::cells::CellLoader;
use crate::{BlockwiseError, Result};

/// Contrast limiting settings handed through to the plugin untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastLimits {
    /// Intensity range is limited to `mean +- std_factor * std`.
    pub std_factor: f32,
    pub bins: usize,
    pub slope: f32,
    pub center: bool,
    pub stretch: bool,
    pub clip: bool,
}

impl Default for ContrastLimits {
    fn default() -> Self {
        Self {
            std_factor: 3.0,
            bins: 10,
            slope: 0.5,
            center: true,
            stretch: true,
            clip: true,
        }
    }
}

/// Parameters of one filter run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParameters {
    /// Spatial radius in pixels; also the padding read around each cell.
    pub radius: i64,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub contrast: ContrastLimits,
}

impl FilterParameters {
    pub fn new(radius: i64, clamp_min: f64, clamp_max: f64) -> Self {
        Self {
            radius,
            clamp_min,
            clamp_max,
            contrast: ContrastLimits::default(),
        }
    }

    pub fn with_contrast(mut self, contrast: ContrastLimits) -> Self {
        self.contrast = contrast;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.radius < 0 {
            return Err(BlockwiseError::InvalidConfig(format!(
                "filter radius must not be negative, got {}",
                self.radius
            )));
        }
        // also rejects NaN bounds
        if !(self.clamp_min <= self.clamp_max) {
            return Err(BlockwiseError::InvalidConfig(format!(
                "empty clamp range [{}, {}]",
                self.clamp_min, self.clamp_max
            )));
        }
        Ok(())
    }
}

/// A 2-D slice of `f32` values, row-major with `x` fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(BlockwiseError::Filter(format!(
                "plane of {width}x{height} cannot hold {} values",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// A filter over one plane.
///
/// Must be a pure function of the plane and the parameters; it may be
/// called concurrently for different planes.
pub trait PlaneFilter: Send + Sync {
    fn apply(&self, plane: &mut Plane, parameters: &FilterParameters) -> Result<()>;
}

impl<F> PlaneFilter for F
where
    F: Fn(&mut Plane, &FilterParameters) -> Result<()> + Send + Sync,
{
    fn apply(&self, plane: &mut Plane, parameters: &FilterParameters) -> Result<()> {
        self(plane, parameters)
    }
}

/// Runs a [`PlaneFilter`] over cells of a source view.
pub struct PlanarFilterOp<T> {
    source: VirtualArray<T>,
    filter: Arc<dyn PlaneFilter>,
    parameters: FilterParameters,
}

impl<T: Numeric> PlanarFilterOp<T> {
    /// Filter `source`; reads outside its bounds see zero.
    pub fn new(
        source: &VirtualArray<T>,
        filter: Arc<dyn PlaneFilter>,
        parameters: FilterParameters,
    ) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            source: source.extend(Extension::Zero)?,
            filter,
            parameters,
        })
    }

    pub fn parameters(&self) -> &FilterParameters {
        &self.parameters
    }

    /// `cell` grown by the radius on the plane axes only.
    fn padded(&self, cell: &Interval) -> Result<Interval> {
        let r = self.parameters.radius;
        let plane_axes = cell.ndim().min(2);
        let min = (0..cell.ndim())
            .map(|d| cell.min_at(d) - if d < plane_axes { r } else { 0 })
            .collect();
        let max = (0..cell.ndim())
            .map(|d| cell.max_at(d) + if d < plane_axes { r } else { 0 })
            .collect();
        Ok(Interval::new(min, max)?)
    }
}

impl<T: Numeric> CellLoader<T> for PlanarFilterOp<T> {
    fn load(&self, cell: &Interval) -> Result<DenseArray<T>> {
        let padded = self.padded(cell)?;
        let input = self.source.materialize(&padded)?;

        let width = padded.dimension(0) as usize;
        let height = if padded.ndim() > 1 {
            padded.dimension(1) as usize
        } else {
            1
        };

        // Axis 0 is fastest, so each plane is one contiguous run.
        let mut filtered = Vec::with_capacity(input.len());
        for values in input.data().chunks(width * height) {
            let data = values.iter().map(|v| v.to_f64() as f32).collect();
            let mut plane = Plane::new(width, height, data)?;
            self.filter.apply(&mut plane, &self.parameters)?;
            if plane.width() != width || plane.height() != height {
                return Err(BlockwiseError::Filter(format!(
                    "filter resized a {width}x{height} plane to {}x{}",
                    plane.width(),
                    plane.height()
                )));
            }
            filtered.extend(plane.into_vec());
        }
        let filtered = DenseArray::from_vec(padded, filtered)?;

        let (lo, hi) = (self.parameters.clamp_min, self.parameters.clamp_max);
        let data = cell
            .positions()
            .map(|p| filtered.get(&p).map(|v| T::from_f64((v as f64).clamp(lo, hi))))
            .collect::<blockwise_view::Result<Vec<T>>>()?;
        Ok(DenseArray::from_vec(cell.clone(), data)?)
    }
}

impl<T> fmt::Debug for PlanarFilterOp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanarFilterOp")
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity(_: &mut Plane, _: &FilterParameters) -> Result<()> {
        Ok(())
    }

    /// Mean over the horizontal neighbours within the radius.
    fn row_mean(plane: &mut Plane, parameters: &FilterParameters) -> Result<()> {
        let r = parameters.radius as usize;
        let source = plane.clone();
        for y in 0..plane.height() {
            for x in r..plane.width() - r {
                let sum: f32 = (x - r..=x + r).map(|i| source.get(i, y)).sum();
                plane.set(x, y, sum / (2 * r + 1) as f32);
            }
        }
        Ok(())
    }

    fn ramp(dims: &[i64]) -> VirtualArray<f32> {
        let interval = Interval::from_dimensions(dims).unwrap();
        VirtualArray::from_source(DenseArray::from_fn(interval, |p| p[0] as f32))
    }

    #[test]
    fn test_default_contrast_limits() {
        let contrast = ContrastLimits::default();
        assert_eq!(contrast.bins, 10);
        assert_relative_eq!(contrast.std_factor, 3.0);
        assert_relative_eq!(contrast.slope, 0.5);
        assert!(contrast.center && contrast.stretch && contrast.clip);
    }

    #[test]
    fn test_parameters_validate() {
        assert!(FilterParameters::new(2, 0.0, 1.0).validate().is_ok());
        assert!(FilterParameters::new(-1, 0.0, 1.0).validate().is_err());
        assert!(FilterParameters::new(2, 1.0, 0.0).validate().is_err());
        assert!(FilterParameters::new(2, f64::NAN, 0.0).validate().is_err());
    }

    #[test]
    fn test_identity_preserves_cell() {
        let view = ramp(&[8, 4, 3]);
        let op = PlanarFilterOp::new(&view, Arc::new(identity), FilterParameters::new(2, 0.0, 100.0))
            .unwrap();
        let cell = Interval::new(vec![2, 1, 1], vec![5, 3, 2]).unwrap();
        let out = op.load(&cell).unwrap();
        assert_eq!(out.interval(), &cell);
        for p in cell.positions() {
            assert_relative_eq!(out.get(&p).unwrap(), p[0] as f32);
        }
    }

    #[test]
    fn test_padding_feeds_neighbourhood() {
        let view = ramp(&[10, 2]);
        let op = PlanarFilterOp::new(&view, Arc::new(row_mean), FilterParameters::new(1, 0.0, 100.0))
            .unwrap();
        // interior of the ramp is unchanged by a symmetric mean
        let cell = Interval::new(vec![3, 0], vec![5, 1]).unwrap();
        let out = op.load(&cell).unwrap();
        assert_relative_eq!(out.get(&[3, 0]).unwrap(), 3.0);
        assert_relative_eq!(out.get(&[5, 1]).unwrap(), 5.0);

        // at the edge the zero extension pulls the mean down: (0 + 0 + 1) / 3
        let edge = Interval::new(vec![0, 0], vec![0, 0]).unwrap();
        let out = op.load(&edge).unwrap();
        assert_relative_eq!(out.get(&[0, 0]).unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn test_output_is_clamped() {
        let view = ramp(&[6]);
        let op = PlanarFilterOp::new(&view, Arc::new(identity), FilterParameters::new(0, 1.0, 3.0))
            .unwrap();
        let cell = Interval::from_dimensions(&[6]).unwrap();
        let out = op.load(&cell).unwrap();
        assert_eq!(out.data(), &[1.0, 1.0, 2.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_integer_output_rounds() {
        let interval = Interval::from_dimensions(&[4, 1]).unwrap();
        let view = VirtualArray::from_source(DenseArray::from_fn(interval.clone(), |p| {
            (p[0] * 2) as u16
        }));
        let halve = |plane: &mut Plane, _: &FilterParameters| -> Result<()> {
            plane.data_mut().iter_mut().for_each(|v| *v *= 0.5);
            Ok(())
        };
        let op = PlanarFilterOp::new(&view, Arc::new(halve), FilterParameters::new(0, 0.0, 65535.0))
            .unwrap();
        let out = op.load(&interval).unwrap();
        assert_eq!(out.data(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_filter_error_propagates() {
        let view = ramp(&[4]);
        let failing = |_: &mut Plane, _: &FilterParameters| -> Result<()> {
            Err(BlockwiseError::Filter("boom".into()))
        };
        let op = PlanarFilterOp::new(&view, Arc::new(failing), FilterParameters::new(0, 0.0, 1.0))
            .unwrap();
        let cell = Interval::from_dimensions(&[4]).unwrap();
        assert!(matches!(op.load(&cell), Err(BlockwiseError::Filter(_))));
    }
}
