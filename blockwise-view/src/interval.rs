//! Inclusive N-dimensional integer intervals.

use std::fmt;

use crate::{Result, ViewError};

/// An inclusive box `[min, max]` of integer coordinates.
///
/// Intervals are never empty: every axis satisfies `min[d] <= max[d]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    min: Vec<i64>,
    max: Vec<i64>,
}

impl Interval {
    /// Create an interval from inclusive bounds.
    pub fn new(min: Vec<i64>, max: Vec<i64>) -> Result<Self> {
        if min.len() != max.len() {
            return Err(ViewError::RankMismatch(min.len(), max.len()));
        }
        if min.is_empty() || min.iter().zip(max.iter()).any(|(&lo, &hi)| lo > hi) {
            return Err(ViewError::EmptyInterval { min, max });
        }
        Ok(Self { min, max })
    }

    /// Interval starting at `offset` with extent `shape`.
    pub fn from_offset_shape(offset: &[i64], shape: &[i64]) -> Result<Self> {
        if offset.len() != shape.len() {
            return Err(ViewError::RankMismatch(offset.len(), shape.len()));
        }
        let max = offset.iter().zip(shape.iter()).map(|(&o, &s)| o + s - 1).collect();
        Self::new(offset.to_vec(), max)
    }

    /// Interval `[0, dimensions)`.
    pub fn from_dimensions(dimensions: &[i64]) -> Result<Self> {
        Self::from_offset_shape(&vec![0; dimensions.len()], dimensions)
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.min.len()
    }

    #[inline]
    pub fn min(&self) -> &[i64] {
        &self.min
    }

    #[inline]
    pub fn max(&self) -> &[i64] {
        &self.max
    }

    #[inline]
    pub fn min_at(&self, d: usize) -> i64 {
        self.min[d]
    }

    #[inline]
    pub fn max_at(&self, d: usize) -> i64 {
        self.max[d]
    }

    /// Extent along axis `d`.
    #[inline]
    pub fn dimension(&self, d: usize) -> i64 {
        self.max[d] - self.min[d] + 1
    }

    /// Extent along every axis.
    pub fn dimensions(&self) -> Vec<i64> {
        (0..self.ndim()).map(|d| self.dimension(d)).collect()
    }

    /// Number of positions in the interval.
    pub fn len(&self) -> usize {
        (0..self.ndim()).map(|d| self.dimension(d) as usize).product()
    }

    /// Intervals are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, position: &[i64]) -> bool {
        position.len() == self.ndim()
            && position
                .iter()
                .zip(self.min.iter().zip(self.max.iter()))
                .all(|(&p, (&lo, &hi))| lo <= p && p <= hi)
    }

    /// True if `other` lies completely inside `self`.
    pub fn contains_interval(&self, other: &Interval) -> bool {
        self.contains(&other.min) && self.contains(&other.max)
    }

    /// Shift by `offset`.
    pub fn translate(&self, offset: &[i64]) -> Result<Interval> {
        if offset.len() != self.ndim() {
            return Err(ViewError::RankMismatch(self.ndim(), offset.len()));
        }
        Ok(Interval {
            min: self.min.iter().zip(offset).map(|(&m, &o)| m + o).collect(),
            max: self.max.iter().zip(offset).map(|(&m, &o)| m + o).collect(),
        })
    }

    /// Intersection, or `None` when the intervals are disjoint.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        if other.ndim() != self.ndim() {
            return None;
        }
        let min = self.min.iter().zip(&other.min).map(|(&a, &b)| a.max(b)).collect();
        let max = self.max.iter().zip(&other.max).map(|(&a, &b)| a.min(b)).collect();
        Interval::new(min, max).ok()
    }

    /// Grow by `radius` on both sides of every axis.
    pub fn expand(&self, radius: i64) -> Interval {
        Interval {
            min: self.min.iter().map(|&m| m - radius).collect(),
            max: self.max.iter().map(|&m| m + radius).collect(),
        }
    }

    /// Iterate over all positions, axis 0 fastest.
    pub fn positions(&self) -> Positions<'_> {
        Positions {
            interval: self,
            next: Some(self.min.clone()),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?} .. {:?}]", self.min, self.max)
    }
}

/// Odometer over the positions of an [`Interval`], axis 0 fastest.
pub struct Positions<'a> {
    interval: &'a Interval,
    next: Option<Vec<i64>>,
}

impl Iterator for Positions<'_> {
    type Item = Vec<i64>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut advanced = current.clone();
        for d in 0..advanced.len() {
            advanced[d] += 1;
            if advanced[d] <= self.interval.max[d] {
                self.next = Some(advanced);
                return Some(current);
            }
            advanced[d] = self.interval.min[d];
        }
        Some(current)
    }
}
