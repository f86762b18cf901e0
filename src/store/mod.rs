//! State containers with subscriber notification.
//!
//! A [`Store`] owns one immutable revision of state at a time, applies
//! merges into fresh revisions, and notifies a snapshot of its listeners
//! synchronously.

mod store;

pub use store::{State, Store, Unsubscribe, Update, WatchOptions, RESERVED_KEYS};
