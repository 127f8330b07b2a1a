//! Elementwise arithmetic and finite differences over lazy views.

use blockwise_traits::Numeric;

use crate::extend::Extension;
use crate::interval::Interval;
use crate::view::{BinaryOp, VirtualArray};
use crate::{Result, ViewError};

/// `a + b`, elementwise.
pub fn add<T: Numeric>(a: &VirtualArray<T>, b: &VirtualArray<T>) -> Result<VirtualArray<T>> {
    a.combine(b, BinaryOp::Add)
}

/// `a - b`, elementwise.
pub fn sub<T: Numeric>(a: &VirtualArray<T>, b: &VirtualArray<T>) -> Result<VirtualArray<T>> {
    a.combine(b, BinaryOp::Sub)
}

/// `a * b`, elementwise.
pub fn mul<T: Numeric>(a: &VirtualArray<T>, b: &VirtualArray<T>) -> Result<VirtualArray<T>> {
    a.combine(b, BinaryOp::Mul)
}

/// `a / b`, elementwise.
pub fn div<T: Numeric>(a: &VirtualArray<T>, b: &VirtualArray<T>) -> Result<VirtualArray<T>> {
    a.combine(b, BinaryOp::Div)
}

/// Central difference along `axis`: `(v(p + e) - v(p - e)) / 2`.
///
/// Samples one step outside the nominal bounds on both sides, so `view`
/// must already be extended.
pub fn center_gradient<T: Numeric>(view: &VirtualArray<T>, axis: usize) -> Result<VirtualArray<T>> {
    let rank = view.ndim();
    if axis >= rank {
        return Err(ViewError::InvalidAxis { axis, rank });
    }
    let mut offset = vec![0i64; rank];
    offset[axis] = -1;
    let behind = view.translate_inverse(&offset)?;
    let ahead = view.translate(&offset)?;
    behind.combine(&ahead, BinaryOp::HalfDifference)
}

/// [`center_gradient`] over a bounded view, mirrored at the boundary and
/// restricted back to `interval`.
pub fn center_gradient_on_interval<T: Numeric>(
    view: &VirtualArray<T>,
    axis: usize,
    interval: &Interval,
) -> Result<VirtualArray<T>> {
    let extended = view.extend(Extension::MirrorSingle)?;
    center_gradient(&extended, axis)?.restrict_to_interval(interval)
}
