use crate::store::{State, Store, Unsubscribe, Update};
use crate::sync;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::iter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// History settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeTravelOptions {
    /// Maximum number of past revisions kept.
    pub limit: usize,
}

impl Default for TimeTravelOptions {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

#[derive(Debug)]
struct History {
    past: VecDeque<State>,
    present: State,
    future: VecDeque<State>,
    limit: usize,
}

impl History {
    fn push_past(&mut self, state: State) {
        self.past.push_back(state);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
    }

    fn record(&mut self, next: State) {
        let previous = std::mem::replace(&mut self.present, next);
        self.push_past(previous);
        self.future.clear();
    }
}

/// Sets the replaying flag for as long as it lives.
struct Replay<'a>(&'a AtomicBool);

impl<'a> Replay<'a> {
    fn begin(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Replay<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Undo/redo history over a [`Store`].
///
/// Every change the store reports is recorded; `undo`, `redo` and `jump`
/// write revisions back into the store without recording them again.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use statewell::{Store, TimeTravel};
///
/// let store = Store::new(json!({ "count": 0 }));
/// let history = TimeTravel::attach(&store, Default::default());
///
/// store.set_state(json!({ "count": 1 }));
/// store.set_state(json!({ "count": 2 }));
///
/// history.undo();
/// assert_eq!(store.get("count"), Some(json!(1)));
/// history.redo();
/// assert_eq!(store.get("count"), Some(json!(2)));
/// ```
pub struct TimeTravel {
    store: Store,
    history: Arc<Mutex<History>>,
    replaying: Arc<AtomicBool>,
    subscription: Option<Unsubscribe>,
}

impl TimeTravel {
    /// Start recording `store`'s changes.
    pub fn attach(store: &Store, options: TimeTravelOptions) -> Self {
        let history = Arc::new(Mutex::new(History {
            past: VecDeque::new(),
            present: store.get_state(),
            future: VecDeque::new(),
            limit: options.limit,
        }));
        let replaying = Arc::new(AtomicBool::new(false));

        let subscription = {
            let history = Arc::clone(&history);
            let replaying = Arc::clone(&replaying);
            store.subscribe(move |next, _| {
                if replaying.load(Ordering::SeqCst) {
                    return;
                }
                sync::lock(&history).record(Arc::clone(next));
            })
        };

        Self {
            store: store.clone(),
            history,
            replaying,
            subscription: Some(subscription),
        }
    }

    /// Step back one revision. Returns `false` when there is nothing to undo.
    pub fn undo(&self) -> bool {
        let target = {
            let mut history = sync::lock(&self.history);
            let Some(previous) = history.past.pop_back() else {
                return false;
            };
            let current = std::mem::replace(&mut history.present, Arc::clone(&previous));
            history.future.push_front(current);
            previous
        };
        tracing::debug!("undo");
        self.replay(target);
        true
    }

    /// Step forward one revision. Returns `false` when there is nothing to
    /// redo.
    pub fn redo(&self) -> bool {
        let target = {
            let mut history = sync::lock(&self.history);
            let Some(next) = history.future.pop_front() else {
                return false;
            };
            let current = std::mem::replace(&mut history.present, Arc::clone(&next));
            history.push_past(current);
            next
        };
        tracing::debug!("redo");
        self.replay(target);
        true
    }

    /// Move to position `index` of the timeline `past + [present] + future`.
    ///
    /// Out-of-range indices leave everything untouched and return `false`.
    pub fn jump(&self, index: usize) -> bool {
        let target = {
            let mut guard = sync::lock(&self.history);
            let history = &mut *guard;
            let len = history.past.len() + 1 + history.future.len();
            if index >= len {
                return false;
            }

            let mut timeline: VecDeque<State> = history
                .past
                .drain(..)
                .chain(iter::once(Arc::clone(&history.present)))
                .chain(history.future.drain(..))
                .collect();
            let present = Arc::clone(&timeline[index]);
            history.future = timeline.split_off(index + 1);
            timeline.truncate(index);

            history.present = Arc::clone(&present);
            for state in timeline {
                history.push_past(state);
            }
            present
        };
        tracing::debug!(index, "jump");
        self.replay(target);
        true
    }

    /// Forget past and future, keeping the store's current state as present.
    pub fn clear(&self) {
        let mut history = sync::lock(&self.history);
        history.past.clear();
        history.future.clear();
        history.present = self.store.get_state();
    }

    fn replay(&self, state: State) {
        let _replay = Replay::begin(&self.replaying);
        self.store.set_state(Update::Replace(state));
    }

    /// Past revisions, oldest first.
    pub fn past(&self) -> Vec<State> {
        sync::lock(&self.history).past.iter().cloned().collect()
    }

    /// The revision history considers current.
    pub fn present(&self) -> State {
        Arc::clone(&sync::lock(&self.history).present)
    }

    /// Undone revisions, nearest first.
    pub fn future(&self) -> Vec<State> {
        sync::lock(&self.history).future.iter().cloned().collect()
    }

    /// Whether [`undo`](Self::undo) would do anything.
    pub fn can_undo(&self) -> bool {
        !sync::lock(&self.history).past.is_empty()
    }

    /// Whether [`redo`](Self::redo) would do anything.
    pub fn can_redo(&self) -> bool {
        !sync::lock(&self.history).future.is_empty()
    }

    /// Configured bound on past revisions.
    pub fn limit(&self) -> usize {
        sync::lock(&self.history).limit
    }

    /// Stop recording the store's changes. Dropping the history has the
    /// same effect.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for TimeTravel {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
