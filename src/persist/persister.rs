use super::adapter::StorageAdapter;
use super::codec::{Codec, JsonCodec, PersistedState};
use crate::error::{Result, StateError, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

type Migrate = Arc<dyn Fn(Value, u32) -> Result<Value> + Send + Sync>;

/// Persistence settings, loadable from a host's configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistOptions {
    /// Prepended to every key written to the adapter.
    pub prefix: String,
    /// Current schema version.
    pub version: u32,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            prefix: "statewell:".to_string(),
            version: 1,
        }
    }
}

/// Versioned serialize/hydrate over a [`StorageAdapter`].
///
/// Entries are written as `{ data, version, timestamp }`. Reads at another
/// version go through the migration function and are written back at the
/// current version.
///
/// # Examples
///
/// ```
/// use serde_json::{json, Value};
/// use statewell::persist::{MemoryStorage, Persister};
/// use std::sync::Arc;
///
/// futures::executor::block_on(async {
///     let persister: Persister<Value> = Persister::new(Arc::new(MemoryStorage::new()));
///     persister.persist("app", &json!({ "count": 1 })).await.unwrap();
///
///     let restored = persister.hydrate("app").await.unwrap();
///     assert_eq!(restored, Some(json!({ "count": 1 })));
///     assert_eq!(persister.hydrate("missing").await.unwrap(), None);
/// });
/// ```
pub struct Persister<T> {
    adapter: Arc<dyn StorageAdapter>,
    codec: Arc<dyn Codec>,
    options: PersistOptions,
    migrate: Option<Migrate>,
    _state: PhantomData<fn() -> T>,
}

impl<T> Persister<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Persist through `adapter` with default options and JSON encoding.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            codec: Arc::new(JsonCodec),
            options: PersistOptions::default(),
            migrate: None,
            _state: PhantomData,
        }
    }

    /// Replace all options.
    pub fn with_options(mut self, options: PersistOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    /// Set the current schema version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.options.version = version;
        self
    }

    /// Migrate data stored at another version: `migrate(data, stored_version)`.
    ///
    /// Errors returned by `migrate` reach the caller of [`hydrate`](Self::hydrate)
    /// unchanged.
    pub fn with_migration<F>(mut self, migrate: F) -> Self
    where
        F: Fn(Value, u32) -> Result<Value> + Send + Sync + 'static,
    {
        self.migrate = Some(Arc::new(migrate));
        self
    }

    /// Use a custom encoding.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Active options.
    pub fn options(&self) -> &PersistOptions {
        &self.options
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.options.prefix, key)
    }

    /// Write `state` under `key` at the current version.
    ///
    /// Capacity failures are returned as [`StateError::StorageQuota`]; other
    /// backend failures are logged and ignored.
    pub async fn persist(&self, key: &str, state: &T) -> Result<()> {
        let full_key = self.full_key(key);
        let entry = PersistedState::now(serde_json::to_value(state)?, self.options.version);
        let raw = self.codec.encode(&entry)?;

        match self.adapter.set(&full_key, &raw).await {
            Ok(()) => {
                tracing::debug!(key = %full_key, version = entry.version, "persisted state");
                Ok(())
            }
            Err(err @ StorageError::QuotaExceeded { .. }) => Err(StateError::StorageQuota {
                key: full_key,
                reason: err.to_string(),
            }),
            Err(err) => {
                tracing::warn!(key = %full_key, error = %err, "failed to persist state");
                Ok(())
            }
        }
    }

    /// Read the state stored under `key`.
    ///
    /// Missing keys and unreadable backends yield `None`. Corrupt entries are
    /// deleted and also yield `None`. Only migration failures and quota
    /// errors while writing back migrated data are returned as errors.
    pub async fn hydrate(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.full_key(key);
        let raw = match self.adapter.get(&full_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(err) => {
                tracing::warn!(key = %full_key, error = %err, "failed to read persisted state");
                return Ok(None);
            }
        };

        let entry = match self.codec.decode(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                self.discard_corrupt(&full_key, &err).await;
                return Ok(None);
            }
        };

        if entry.version == self.options.version {
            return match serde_json::from_value(entry.data) {
                Ok(state) => Ok(Some(state)),
                Err(err) => {
                    self.discard_corrupt(&full_key, &err.into()).await;
                    Ok(None)
                }
            };
        }

        let Some(migrate) = &self.migrate else {
            tracing::warn!(
                key = %full_key,
                stored = entry.version,
                current = self.options.version,
                "version mismatch without a migration, using stored data as-is"
            );
            return match serde_json::from_value(entry.data) {
                Ok(state) => Ok(Some(state)),
                Err(err) => {
                    self.discard_corrupt(&full_key, &err.into()).await;
                    Ok(None)
                }
            };
        };

        tracing::info!(
            key = %full_key,
            from = entry.version,
            to = self.options.version,
            "migrating persisted state"
        );
        let migrated: T = serde_json::from_value(migrate(entry.data, entry.version)?)?;
        self.persist(key, &migrated).await?;
        Ok(Some(migrated))
    }

    /// Delete the entry stored under `key`.
    pub async fn remove(&self, key: &str) {
        let full_key = self.full_key(key);
        if let Err(err) = self.adapter.remove(&full_key).await {
            tracing::warn!(key = %full_key, error = %err, "failed to remove persisted state");
        }
    }

    /// Delete every entry under this persister's prefix.
    ///
    /// When the adapter cannot enumerate keys this clears the entire
    /// adapter, including entries written by other prefixes.
    pub async fn clear(&self) {
        let keys = match self.adapter.keys().await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list persisted keys");
                return;
            }
        };

        let Some(keys) = keys else {
            tracing::debug!("adapter cannot enumerate keys, clearing everything");
            if let Err(err) = self.adapter.clear().await {
                tracing::warn!(error = %err, "failed to clear storage");
            }
            return;
        };

        for key in keys.iter().filter(|k| k.starts_with(&self.options.prefix)) {
            if let Err(err) = self.adapter.remove(key).await {
                tracing::warn!(key = %key, error = %err, "failed to remove persisted state");
            }
        }
    }

    async fn discard_corrupt(&self, full_key: &str, err: &StateError) {
        tracing::warn!(key = %full_key, error = %err, "discarding corrupt persisted state");
        if let Err(err) = self.adapter.remove(full_key).await {
            tracing::warn!(key = %full_key, error = %err, "failed to remove corrupt state");
        }
    }
}
