//! Versioned persistence over abstract key-value storage.
//!
//! A [`Persister`] wraps state in a [`PersistedState`] envelope, encodes it
//! with a [`Codec`] and writes it through a [`StorageAdapter`]. Read
//! failures degrade to `None`; only capacity errors reach writers.

mod adapter;
mod binding;
mod codec;
mod persister;

pub use adapter::{FileStorage, MemoryStorage, StorageAdapter};
pub use binding::PersistBinding;
pub use codec::{Codec, JsonCodec, PersistedState};
pub use persister::{PersistOptions, Persister};
