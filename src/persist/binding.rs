use super::persister::Persister;
use crate::error::{Result, StateError};
use crate::store::{State, Store, Unsubscribe};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

impl Persister<Value> {
    /// Keep `store` persisted under `key`.
    ///
    /// The stored entry, if any, is hydrated and merged into the store
    /// first. After that every state change is queued and written in order
    /// by a background task, whether it came from a pipeline or a plain
    /// [`Store::set_state`].
    ///
    /// Must be called inside a Tokio runtime; otherwise nothing is read or
    /// subscribed and [`StateError::Runtime`] is returned.
    pub async fn bind(
        self: Arc<Self>,
        store: &Store,
        key: impl Into<String>,
    ) -> Result<PersistBinding> {
        let runtime = tokio::runtime::Handle::try_current().map_err(StateError::Runtime)?;
        let key = key.into();

        if let Some(saved) = self.hydrate(&key).await? {
            tracing::debug!(key = %key, "hydrated store from storage");
            store.set_state(saved);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<State>();
        let subscription = store.subscribe(move |next, _| {
            let _ = tx.send(Arc::clone(next));
        });

        let writer = {
            let key = key.clone();
            runtime.spawn(async move {
                while let Some(state) = rx.recv().await {
                    if let Err(err) = self.persist(&key, &state).await {
                        tracing::error!(key = %key, error = %err, "failed to persist change");
                    }
                }
            })
        };

        Ok(PersistBinding {
            key,
            subscription: Some(subscription),
            writer: Some(writer),
        })
    }
}

/// Live link between a [`Store`] and a [`Persister`], created by
/// [`Persister::bind`].
///
/// Dropping the binding stops observing the store; changes already queued
/// are still written.
pub struct PersistBinding {
    key: String,
    subscription: Option<Unsubscribe>,
    writer: Option<JoinHandle<()>>,
}

impl PersistBinding {
    /// Key the store is persisted under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop observing the store and wait until queued changes are written.
    pub async fn detach(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.await {
                tracing::warn!(key = %self.key, error = %err, "persistence writer failed");
            }
        }
    }
}

impl Drop for PersistBinding {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
