//! Shared traits for the blockwise ecosystem.
//!
//! This crate provides the element capability shared by `blockwise-view` and
//! the root `blockwise` crate. External crates can depend on
//! `blockwise-traits` to make their own element types usable in lazy views
//! without orphan rule violations.

pub mod numeric;

pub use numeric::Numeric;
