//! Runtime support for derived values.
//!
//! This module provides the dependency tracker that computed properties use
//! to learn which state paths a computation reads.

mod tracker;

pub use tracker::DependencyTracker;
