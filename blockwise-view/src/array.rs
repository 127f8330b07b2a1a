//! Owned arrays placed in world coordinates.

use std::sync::Arc;

use blockwise_traits::Numeric;

use crate::interval::Interval;
use crate::{Result, ViewError};

/// Owned N-dimensional array covering an [`Interval`].
///
/// Data is stored with axis 0 varying fastest. Positions are world
/// coordinates, so an array read from `[4, 8] .. [7, 9]` is addressed with
/// those coordinates and not with zero-based indices.
#[derive(Clone, PartialEq)]
pub struct DenseArray<T> {
    interval: Interval,
    strides: Arc<[usize]>,
    data: Vec<T>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for DenseArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseArray")
            .field("interval", &self.interval)
            .field("len", &self.data.len())
            .finish()
    }
}

fn axis_zero_fastest_strides(interval: &Interval) -> Arc<[usize]> {
    let mut strides = vec![1usize; interval.ndim()];
    for d in 1..interval.ndim() {
        strides[d] = strides[d - 1] * interval.dimension(d - 1) as usize;
    }
    Arc::from(strides)
}

impl<T: Clone> DenseArray<T> {
    /// Array over `interval` with every element set to `value`.
    pub fn filled(interval: Interval, value: T) -> Self {
        let data = vec![value; interval.len()];
        let strides = axis_zero_fastest_strides(&interval);
        Self {
            interval,
            strides,
            data,
        }
    }
}

impl<T> DenseArray<T> {
    /// Array with values produced by a function of the world position.
    ///
    /// The function is called in storage order (axis 0 fastest).
    pub fn from_fn(interval: Interval, mut f: impl FnMut(&[i64]) -> T) -> Self {
        let data = interval.positions().map(|p| f(&p)).collect();
        let strides = axis_zero_fastest_strides(&interval);
        Self {
            interval,
            strides,
            data,
        }
    }

    /// Wrap existing data laid out with axis 0 fastest.
    pub fn from_vec(interval: Interval, data: Vec<T>) -> Result<Self> {
        if data.len() != interval.len() {
            return Err(ViewError::LengthMismatch {
                len: data.len(),
                expected: interval.len(),
            });
        }
        let strides = axis_zero_fastest_strides(&interval);
        Ok(Self {
            interval,
            strides,
            data,
        })
    }

    #[inline]
    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.interval.ndim()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Linear storage index of a world position.
    pub fn linear_index(&self, position: &[i64]) -> Result<usize> {
        if !self.interval.contains(position) {
            return Err(ViewError::OutOfBounds {
                position: position.to_vec(),
                interval: self.interval.clone(),
            });
        }
        Ok(position
            .iter()
            .zip(self.interval.min())
            .zip(self.strides.iter())
            .map(|((&p, &lo), &s)| (p - lo) as usize * s)
            .sum())
    }
}

impl<T: Copy> DenseArray<T> {
    pub fn get(&self, position: &[i64]) -> Result<T> {
        Ok(self.data[self.linear_index(position)?])
    }

    pub fn set(&mut self, position: &[i64], value: T) -> Result<()> {
        let idx = self.linear_index(position)?;
        self.data[idx] = value;
        Ok(())
    }
}

impl<T: PartialEq> DenseArray<T> {
    /// True if every element equals `value`.
    pub fn is_uniform(&self, value: &T) -> bool {
        self.data.iter().all(|v| v == value)
    }
}

impl<T: Numeric> DenseArray<T> {
    /// Array over `interval` filled with zero.
    pub fn zeros(interval: Interval) -> Self {
        Self::filled(interval, T::zero())
    }

    /// Copy the part of `self` that overlaps `other` into `other`.
    pub fn copy_overlap_into(&self, other: &mut DenseArray<T>) -> Result<()> {
        let Some(overlap) = self.interval.intersect(other.interval()) else {
            return Ok(());
        };
        for p in overlap.positions() {
            other.set(&p, self.get(&p)?)?;
        }
        Ok(())
    }
}
