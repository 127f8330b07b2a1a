//! Numeric element capability for lazily evaluated arrays.
//!
//! Every combinator in `blockwise-view` is written against [`Numeric`]
//! instead of against a concrete pixel type. The arithmetic methods work in
//! place on a destination accumulator: the operands are only read, so
//! combining two elements never mutates either source.
//!
//! Integer implementations wrap on overflow and yield zero on division by
//! zero. Conversions from `f64` round to nearest and saturate at the type
//! bounds, which is what a clamp to the output value range expects.

use num_traits::{Bounded, NumCast, ToPrimitive};
use std::fmt::Debug;

/// Element types usable inside virtual arrays.
pub trait Numeric: Copy + Send + Sync + PartialEq + Debug + 'static {
    /// The additive identity, also the background value of a dataset.
    fn zero() -> Self;

    /// A fresh destination element for a combinator.
    #[inline(always)]
    fn create_variable() -> Self {
        Self::zero()
    }

    /// `self = other`
    #[inline(always)]
    fn set(&mut self, other: &Self) {
        *self = *other;
    }

    /// `self += rhs`
    fn add(&mut self, rhs: &Self);

    /// `self -= rhs`
    fn sub(&mut self, rhs: &Self);

    /// `self *= rhs`
    fn mul(&mut self, rhs: &Self);

    /// `self /= rhs`
    fn div(&mut self, rhs: &Self);

    /// `self *= factor` with a real-valued factor.
    fn scale(&mut self, factor: f64);

    /// Widen to `f64`.
    fn to_f64(&self) -> f64;

    /// Narrow from `f64`, rounding and saturating for integer types.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_numeric_float {
    ($($t:ty),*) => {
        $(
            impl Numeric for $t {
                #[inline(always)]
                fn zero() -> Self { 0.0 }
                #[inline(always)]
                fn add(&mut self, rhs: &Self) { *self += *rhs; }
                #[inline(always)]
                fn sub(&mut self, rhs: &Self) { *self -= *rhs; }
                #[inline(always)]
                fn mul(&mut self, rhs: &Self) { *self *= *rhs; }
                #[inline(always)]
                fn div(&mut self, rhs: &Self) { *self /= *rhs; }
                #[inline(always)]
                fn scale(&mut self, factor: f64) { *self = (*self as f64 * factor) as $t; }
                #[inline(always)]
                fn to_f64(&self) -> f64 { *self as f64 }
                #[inline(always)]
                fn from_f64(value: f64) -> Self { value as $t }
            }
        )*
    };
}

macro_rules! impl_numeric_int {
    ($($t:ty),*) => {
        $(
            impl Numeric for $t {
                #[inline(always)]
                fn zero() -> Self { 0 }
                #[inline(always)]
                fn add(&mut self, rhs: &Self) { *self = self.wrapping_add(*rhs); }
                #[inline(always)]
                fn sub(&mut self, rhs: &Self) { *self = self.wrapping_sub(*rhs); }
                #[inline(always)]
                fn mul(&mut self, rhs: &Self) { *self = self.wrapping_mul(*rhs); }
                #[inline(always)]
                fn div(&mut self, rhs: &Self) { *self = self.checked_div(*rhs).unwrap_or(0); }
                #[inline(always)]
                fn scale(&mut self, factor: f64) { *self = Self::from_f64(Numeric::to_f64(self) * factor); }
                #[inline(always)]
                fn to_f64(&self) -> f64 { ToPrimitive::to_f64(self).unwrap_or(0.0) }
                fn from_f64(value: f64) -> Self {
                    if value.is_nan() {
                        return 0;
                    }
                    let lo = <$t as Bounded>::min_value();
                    let hi = <$t as Bounded>::max_value();
                    let rounded = value.round();
                    if rounded <= ToPrimitive::to_f64(&lo).unwrap_or(f64::MIN) {
                        lo
                    } else if rounded >= ToPrimitive::to_f64(&hi).unwrap_or(f64::MAX) {
                        hi
                    } else {
                        <$t as NumCast>::from(rounded).unwrap_or(0)
                    }
                }
            }
        )*
    };
}

impl_numeric_float!(f32, f64);
impl_numeric_int!(i8, i16, i32, i64, u8, u16, u32, u64);
