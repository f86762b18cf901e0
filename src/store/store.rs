use crate::path;
use crate::runtime::DependencyTracker;
use crate::sync;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// One immutable revision of the store's state.
///
/// A revision is never mutated once published; identity comparisons use
/// [`Arc::ptr_eq`].
pub type State = Arc<Value>;

type Listener = Arc<dyn Fn(&State, &State) + Send + Sync>;
type ListenerSet = RwLock<Vec<(u64, Listener)>>;

/// Field names that belong to the store API and cannot be written as state.
pub const RESERVED_KEYS: &[&str] = &[
    "getState",
    "setState",
    "subscribe",
    "destroy",
    "get_state",
    "set_state",
];

/// Options for [`Store::watch_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call the handler once with the current value when registering.
    pub immediate: bool,
}

/// A resolved state update.
#[derive(Clone, Debug)]
pub enum Update {
    /// Shallow-merged into a new object when it is an object, otherwise it
    /// replaces the state outright.
    Partial(Value),
    /// A complete revision. Ignored when it is the current revision,
    /// otherwise installed without merging.
    Replace(State),
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Partial(value)
    }
}

impl From<State> for Update {
    fn from(state: State) -> Self {
        Update::Replace(state)
    }
}

/// A thread-safe store owning the current state and its listeners.
///
/// Cloning a store yields another handle onto the same state.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use statewell::Store;
///
/// let store = Store::new(json!({ "count": 0 }));
/// let _sub = store.subscribe(|next, prev| {
///     assert_eq!(prev["count"], 0);
///     assert_eq!(next["count"], 1);
/// });
///
/// store.set_state(json!({ "count": 1 }));
/// assert_eq!(store.get("count"), Some(json!(1)));
/// ```
pub struct Store {
    state: Arc<RwLock<State>>,
    listeners: Arc<ListenerSet>,
    next_id: Arc<AtomicU64>,
    revision: Arc<AtomicU64>,
}

impl Store {
    /// Create a new store with the given initial state.
    pub fn new(initial: Value) -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(initial))),
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a store whose initial state comes from a factory.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: FnOnce() -> Value,
    {
        Self::new(factory())
    }

    /// The current revision. Repeated calls without an update return the
    /// same `Arc`.
    pub fn get_state(&self) -> State {
        Arc::clone(&sync::read(&self.state))
    }

    /// Apply an update and notify every listener.
    pub fn set_state(&self, update: impl Into<Update>) {
        let update = update.into();
        self.apply(update);
    }

    /// Resolve an update against the current revision, then apply it.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&State) -> Update,
    {
        let current = self.get_state();
        let update = f(&current);
        self.apply(update);
    }

    fn apply(&self, update: Update) {
        let (next, prev) = {
            let mut state = sync::write(&self.state);
            let next = match update {
                Update::Replace(next) if Arc::ptr_eq(&next, &state) => {
                    tracing::trace!("update is the current revision, skipping");
                    return;
                }
                Update::Replace(next) => next,
                Update::Partial(partial) => Arc::new(merge(&state, partial)),
            };
            let prev = std::mem::replace(&mut *state, Arc::clone(&next));
            (next, prev)
        };

        self.revision.fetch_add(1, Ordering::SeqCst);
        self.notify(&next, &prev);
    }

    /// Notify a snapshot of the listener set.
    fn notify(&self, next: &State, prev: &State) {
        let listeners: Vec<Listener> = sync::read(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::trace!(listeners = listeners.len(), "notifying listeners");
        for listener in listeners {
            listener(next, prev);
        }
    }

    /// Subscribe to state changes.
    ///
    /// The callback receives `(new_state, previous_state)` after every
    /// applied update.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&State, &State) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        sync::write(&self.listeners).push((id, Arc::new(listener)));
        Unsubscribe {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Subscribe to changes of the value at `path` only.
    ///
    /// The handler receives `(new_value, old_value)`, either of which may be
    /// absent.
    pub fn watch<F>(&self, path: &str, handler: F) -> Unsubscribe
    where
        F: Fn(Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    {
        self.watch_with(path, WatchOptions::default(), handler)
    }

    /// [`watch`](Self::watch) with options.
    ///
    /// With `immediate` set, the handler is first called synchronously with
    /// the current value and no old value.
    pub fn watch_with<F>(&self, path: &str, options: WatchOptions, handler: F) -> Unsubscribe
    where
        F: Fn(Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    {
        if options.immediate {
            let current = self.get_state();
            handler(path::lookup(&current, path), None);
        }

        let path = path.to_string();
        self.subscribe(move |next, prev| {
            let new = path::lookup(next, &path);
            let old = path::lookup(prev, &path);
            if new != old {
                handler(new, old);
            }
        })
    }

    /// Remove every listener. Updates still apply but notify no one.
    pub fn destroy(&self) {
        sync::write(&self.listeners).clear();
    }

    /// Read the value at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        path::lookup(&self.get_state(), path).cloned()
    }

    /// Read the value at `path`, recording the read in `tracker`.
    pub fn get_tracked(&self, path: &str, tracker: &DependencyTracker) -> Option<Value> {
        tracker.track(path);
        self.get(path)
    }

    /// Whether a value exists at `path`.
    pub fn has(&self, path: &str) -> bool {
        path::lookup(&self.get_state(), path).is_some()
    }

    /// Write `value` at `path` as a new revision.
    ///
    /// Writes whose first segment is a reserved API name are rejected with
    /// a warning and return `false`.
    pub fn set(&self, path: &str, value: Value) -> bool {
        let Some(root) = path::root(path) else {
            tracing::warn!("rejected write with an empty path");
            return false;
        };
        if RESERVED_KEYS.contains(&root) {
            tracing::warn!(key = root, "cannot overwrite reserved store member");
            return false;
        }

        self.update(|state| Update::Replace(Arc::new(path::assign(state, path, value))));
        true
    }

    /// Read state without cloning the revision handle.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Value) -> R,
    {
        let state = sync::read(&self.state);
        f(&state)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        sync::read(&self.listeners).len()
    }

    /// Number of updates applied since creation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
            revision: Arc::clone(&self.revision),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Shallow merge: object partials extend object state into a new object;
/// anything else replaces.
fn merge(current: &Value, partial: Value) -> Value {
    match (current, partial) {
        (Value::Object(current), Value::Object(partial)) => {
            let mut merged = current.clone();
            merged.extend(partial);
            Value::Object(merged)
        }
        (_, partial) => partial,
    }
}

/// Handle returned by [`Store::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Unsubscribe::unsubscribe`] to remove it.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Unsubscribe {
    id: u64,
    listeners: Weak<ListenerSet>,
}

impl Unsubscribe {
    /// Remove exactly the listener this handle was created for.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            sync::write(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
