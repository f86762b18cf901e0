//! Error types for the state engine.
//!
//! Fallible engine operations return [`StateError`] through the crate
//! [`Result`] alias. Storage backends report [`StorageError`], which the
//! persister mostly swallows; only capacity failures reach callers.

/// Boxed error used for caller-supplied computations and migrations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors surfaced by stores, pipelines, computed values and persistence.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// A middleware rejected the state produced by the rest of the chain.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The storage backend ran out of room while persisting.
    #[error("storage quota exceeded while persisting {key:?}: {reason}")]
    StorageQuota {
        /// Fully prefixed storage key.
        key: String,
        /// Backend-provided description.
        reason: String,
    },

    /// A caller-supplied migration failed.
    #[error("migration from version {from} failed")]
    Migration {
        /// Version found in storage.
        from: u32,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// A computed property's function returned an error.
    #[error("computation failed")]
    Computation(#[source] BoxError),

    /// State could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A background task was requested outside a Tokio runtime.
    #[error("no Tokio runtime available")]
    Runtime(#[source] tokio::runtime::TryCurrentError),

    /// Any other middleware failure.
    #[error("middleware {name} failed: {source}")]
    Middleware {
        /// Middleware name.
        name: String,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },
}

impl StateError {
    /// Build a migration error from any error type.
    pub fn migration(from: u32, source: impl Into<BoxError>) -> Self {
        Self::Migration {
            from,
            source: source.into(),
        }
    }

    /// Build a middleware error from any error type.
    pub fn middleware(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Middleware {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Errors reported by a [`StorageAdapter`](crate::persist::StorageAdapter).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend has no capacity left for the value.
    #[error("quota exceeded for {key:?}: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Bytes the write required.
        needed: usize,
        /// Bytes still free.
        available: usize,
    },

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}
