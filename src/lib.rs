//! # Statewell
//!
//! A reactive state engine for Rust.
//!
//! Statewell keeps application state in a [`Store`] and layers the usual
//! state-management concerns on top of it:
//!
//! ## Core
//!
//! - `Store` - Owns immutable state revisions and notifies subscribers
//! - `ComputedProperty` - Memoized derived values with tracked dependencies
//! - `DependencyTracker` - Records which paths a computation reads
//!
//! ## Around the store
//!
//! - `Pipeline` - Ordered middleware wrapping every action
//! - `Persister` - Versioned persistence with migration over any key-value backend
//! - `TimeTravel` - Bounded undo/redo/jump history
//! - `Inspector` - Change log with per-path diffs for debugging
//!
//! The engine renders nothing. Presentation layers call
//! [`Store::subscribe`] and re-render on their own.

pub mod devtools;
pub mod error;
pub mod history;
pub mod memo;
pub mod middleware;
pub mod path;
pub mod persist;
pub mod runtime;
pub mod store;

mod sync;

// Re-export main types for convenience
pub use devtools::{Inspector, InspectorOptions};
pub use error::{BoxError, Result, StateError, StorageError};
pub use history::{TimeTravel, TimeTravelOptions};
pub use memo::{create_computed, ComputedProperty};
pub use middleware::{ActionContext, Middleware, Next, Pipeline};
pub use persist::{PersistBinding, PersistOptions, Persister, StorageAdapter};
pub use runtime::DependencyTracker;
pub use store::{State, Store, Unsubscribe, Update, WatchOptions};
