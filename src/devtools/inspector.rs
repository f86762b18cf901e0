use super::diff::{diff, Change};
use crate::error::Result;
use crate::store::{State, Store, Unsubscribe};
use crate::sync;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Inspector settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorOptions {
    /// Maximum number of records kept; oldest are dropped first.
    pub max_entries: usize,
}

impl Default for InspectorOptions {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

/// One observed state change.
#[derive(Clone, Debug, Serialize)]
pub struct ChangeRecord {
    /// Sequence number, starting at 1 for the first recorded change.
    pub seq: u64,
    /// Observation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Revision before the change.
    pub previous: State,
    /// Revision after the change.
    pub next: State,
    /// Differences between the two.
    pub changes: Vec<Change>,
}

/// Diagnostic change log attached to a [`Store`].
///
/// The inspector only observes; it never writes to the store.
pub struct Inspector {
    log: Arc<Mutex<VecDeque<ChangeRecord>>>,
    subscription: Option<Unsubscribe>,
}

impl Inspector {
    /// Start logging `store`'s changes.
    pub fn attach(store: &Store, options: InspectorOptions) -> Self {
        let log = Arc::new(Mutex::new(VecDeque::new()));
        let seq = Arc::new(AtomicU64::new(0));

        let subscription = {
            let log = Arc::clone(&log);
            let max_entries = options.max_entries;
            store.subscribe(move |next, prev| {
                let record = ChangeRecord {
                    seq: seq.fetch_add(1, Ordering::SeqCst) + 1,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    previous: Arc::clone(prev),
                    next: Arc::clone(next),
                    changes: diff(prev, next),
                };
                for change in &record.changes {
                    tracing::debug!(
                        seq = record.seq,
                        path = change.path(),
                        ?change,
                        "state changed"
                    );
                }

                let mut log = sync::lock(&log);
                log.push_back(record);
                while log.len() > max_entries {
                    log.pop_front();
                }
            })
        };

        Self {
            log,
            subscription: Some(subscription),
        }
    }

    /// Recorded changes, oldest first.
    pub fn records(&self) -> Vec<ChangeRecord> {
        sync::lock(&self.log).iter().cloned().collect()
    }

    /// Most recent change.
    pub fn latest(&self) -> Option<ChangeRecord> {
        sync::lock(&self.log).back().cloned()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        sync::lock(&self.log).len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records.
    pub fn clear(&self) {
        sync::lock(&self.log).clear();
    }

    /// The log as a JSON array.
    pub fn export(&self) -> Result<String> {
        let log = sync::lock(&self.log);
        Ok(serde_json::to_string_pretty(&*log)?)
    }

    /// Stop observing the store. Dropping the inspector has the same effect.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
