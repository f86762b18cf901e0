use crate::error::{BoxError, Result, StateError};
use crate::path;
use crate::runtime::DependencyTracker;
use crate::store::{Store, Unsubscribe};
use crate::sync;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

type Compute<T> = Arc<dyn Fn(&DependencyTracker) -> std::result::Result<T, BoxError> + Send + Sync>;
type Equality<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

struct Cache<T> {
    value: Option<Arc<T>>,
    valid: bool,
    dependencies: BTreeSet<String>,
}

/// A memoized derived value whose dependencies are recorded while it runs.
///
/// The computation receives this property's own [`DependencyTracker`] and
/// reports reads through it, usually via [`Store::get_tracked`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use statewell::{ComputedProperty, Store};
///
/// let store = Store::new(json!({ "count": 5 }));
/// let doubled = ComputedProperty::new({
///     let store = store.clone();
///     move |tracker| {
///         let count = store.get_tracked("count", tracker).and_then(|v| v.as_i64());
///         Ok(count.unwrap_or(0) * 2)
///     }
/// });
///
/// assert_eq!(*doubled.get().unwrap(), 10);
/// assert!(doubled.is_cached());
/// assert!(doubled.get_dependencies().contains("count"));
/// ```
pub struct ComputedProperty<T> {
    compute: Compute<T>,
    equals: Equality<T>,
    memoize: bool,
    tracker: DependencyTracker,
    cache: Arc<Mutex<Cache<T>>>,
}

impl<T: Send + Sync + 'static> ComputedProperty<T> {
    /// Create a computed property around a pure computation.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&DependencyTracker) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(compute),
            equals: Arc::new(|_, _| false),
            memoize: true,
            tracker: DependencyTracker::new(),
            cache: Arc::new(Mutex::new(Cache {
                value: None,
                valid: false,
                dependencies: BTreeSet::new(),
            })),
        }
    }

    /// Use `equals` to decide whether a fresh result replaces the cached one.
    ///
    /// By default every recompute replaces the cache.
    pub fn with_equality<E>(mut self, equals: E) -> Self
    where
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.equals = Arc::new(equals);
        self
    }

    /// Enable or disable memoization. Disabled properties recompute on
    /// every read.
    pub fn memoize(mut self, enabled: bool) -> Self {
        self.memoize = enabled;
        self
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Errors from the computation are returned as
    /// [`StateError::Computation`] with the underlying error as its source;
    /// tracking is stopped before the error is returned.
    pub fn get(&self) -> Result<Arc<T>> {
        if self.memoize {
            let cache = sync::lock(&self.cache);
            if cache.valid {
                if let Some(value) = &cache.value {
                    return Ok(Arc::clone(value));
                }
            }
        }

        let session = self.tracker.session();
        let outcome = (self.compute)(&self.tracker);
        let dependencies = session.finish();
        let fresh = Arc::new(outcome.map_err(StateError::Computation)?);

        let mut cache = sync::lock(&self.cache);
        let unchanged = cache
            .value
            .as_ref()
            .is_some_and(|cached| (self.equals)(cached, &fresh));
        if !unchanged {
            cache.value = Some(Arc::clone(&fresh));
        }
        if cache.dependencies != dependencies {
            tracing::trace!(?dependencies, "computed dependencies changed");
            cache.dependencies = dependencies;
        }
        cache.valid = self.memoize;

        Ok(fresh)
    }

    /// Read the value from inside another computation.
    ///
    /// Same as [`get`](Self::get), then records this property's
    /// dependencies in `tracker`, so the outer property is invalidated by
    /// the same paths.
    pub fn get_tracked(&self, tracker: &DependencyTracker) -> Result<Arc<T>> {
        let value = self.get()?;
        for dep in &sync::lock(&self.cache).dependencies {
            tracker.track(dep);
        }
        Ok(value)
    }

    /// Drop the cached value so the next [`get`](Self::get) recomputes.
    pub fn invalidate(&self) {
        let mut cache = sync::lock(&self.cache);
        cache.value = None;
        cache.valid = false;
    }

    /// Whether a valid cached value is held.
    pub fn is_cached(&self) -> bool {
        sync::lock(&self.cache).valid
    }

    /// Paths read by the last successful computation.
    pub fn get_dependencies(&self) -> BTreeSet<String> {
        sync::lock(&self.cache).dependencies.clone()
    }

    /// Invalidate automatically when `store` changes a recorded dependency.
    ///
    /// The stale value is kept for the equality check of the next
    /// recompute but is no longer served.
    pub fn bind(&self, store: &Store) -> Unsubscribe {
        let cache = Arc::clone(&self.cache);
        store.subscribe(move |next, prev| {
            let mut cache = sync::lock(&cache);
            if !cache.valid {
                return;
            }
            let stale = cache
                .dependencies
                .iter()
                .any(|dep| path::lookup(next, dep) != path::lookup(prev, dep));
            if stale {
                tracing::trace!("computed dependency changed, invalidating");
                cache.valid = false;
            }
        })
    }
}

impl<T> Clone for ComputedProperty<T> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            equals: Arc::clone(&self.equals),
            memoize: self.memoize,
            tracker: self.tracker.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Create a new computed property.
///
/// # Example
///
/// ```ignore
/// let total = create_computed(move |tracker| {
///     Ok(store.get_tracked("price", tracker).and_then(|v| v.as_f64()).unwrap_or(0.0) * 1.2)
/// });
/// ```
pub fn create_computed<T, F>(compute: F) -> ComputedProperty<T>
where
    T: Send + Sync + 'static,
    F: Fn(&DependencyTracker) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
{
    ComputedProperty::new(compute)
}
