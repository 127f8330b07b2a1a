//! Lazily evaluated N-dimensional array views.
//!
//! A [`VirtualArray`] is an addressable function from an integer coordinate
//! to a value. Views are composed by wrapping: translating the origin,
//! extending a bounded view over the whole coordinate space, combining two
//! views elementwise, and restricting to an interval. Nothing is evaluated
//! until [`VirtualArray::get`] or [`VirtualArray::materialize`] is called, so
//! views nest arbitrarily deep without intermediate buffers.
//!
//! # Core Types
//!
//! - [`Interval`]: inclusive N-dimensional box of integer coordinates
//! - [`DenseArray`]: owned array placed at an interval in world coordinates
//! - [`VirtualArray`]: the tagged lazy view evaluated by a single resolver
//! - [`Extension`]: boundary policies for out-of-bounds reads
//!
//! # Example
//!
//! ```rust
//! use blockwise_view::{center_gradient_on_interval, DenseArray, Interval, VirtualArray};
//!
//! let bounds = Interval::from_dimensions(&[10]).unwrap();
//! let ramp = DenseArray::from_fn(bounds.clone(), |p| p[0] as f64);
//! let view = VirtualArray::from_source(ramp);
//!
//! let gradient = center_gradient_on_interval(&view, 0, &bounds).unwrap();
//! assert_eq!(gradient.get(&[4]).unwrap(), 1.0);
//! ```

mod array;
mod extend;
mod interval;
mod ops;
mod view;

pub use array::DenseArray;
pub use extend::Extension;
pub use interval::{Interval, Positions};
pub use ops::{add, center_gradient, center_gradient_on_interval, div, mul, sub};
pub use view::{BinaryOp, Source, VirtualArray};

pub use blockwise_traits::Numeric;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while building or evaluating views.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    /// Ranks of two operands, or of a view and a coordinate, do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Invalid axis index for the given rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// A coordinate was read outside the bounds of a bounded view.
    #[error("position {position:?} outside of {interval}")]
    OutOfBounds { position: Vec<i64>, interval: Interval },

    /// An interval with `min > max` on some axis, or of rank 0.
    #[error("empty interval: min {min:?}, max {max:?}")]
    EmptyInterval { min: Vec<i64>, max: Vec<i64> },

    /// Data length does not match the number of positions in an interval.
    #[error("data length {len} does not match interval size {expected}")]
    LengthMismatch { len: usize, expected: usize },

    /// An extension was requested for a view that has no finite bounds.
    #[error("cannot extend a view without finite bounds")]
    Unbounded,

    /// A lazily evaluated source failed to produce a value.
    #[error("source read failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;
