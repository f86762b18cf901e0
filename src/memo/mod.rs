//! Memoized derived values with automatic dependency tracking.

mod computed;

pub use computed::{create_computed, ComputedProperty};
