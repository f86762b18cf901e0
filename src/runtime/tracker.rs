use crate::sync;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct TrackerState {
    enabled: bool,
    paths: BTreeSet<String>,
}

/// Records which state paths are read during a computation window.
///
/// Each computed property owns its own tracker, so nested or interleaved
/// computations never write into each other's dependency sets. Clones share
/// the same recording.
///
/// # Examples
///
/// ```
/// use statewell::runtime::DependencyTracker;
///
/// let tracker = DependencyTracker::new();
/// tracker.track("ignored");
///
/// tracker.start_tracking();
/// tracker.track("user.name");
/// let deps = tracker.stop_tracking();
///
/// assert_eq!(deps.len(), 1);
/// assert!(deps.contains("user.name"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct DependencyTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl DependencyTracker {
    /// Create a tracker that is not recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the recorded paths and begin recording.
    pub fn start_tracking(&self) {
        let mut state = sync::lock(&self.state);
        state.paths.clear();
        state.enabled = true;
    }

    /// Stop recording and hand back everything captured since the last start.
    pub fn stop_tracking(&self) -> BTreeSet<String> {
        let mut state = sync::lock(&self.state);
        state.enabled = false;
        std::mem::take(&mut state.paths)
    }

    /// Record a read of `path`. Ignored while not tracking.
    pub fn track(&self, path: &str) {
        let mut state = sync::lock(&self.state);
        if state.enabled {
            state.paths.insert(path.to_string());
        }
    }

    /// Whether reads are currently being recorded.
    pub fn is_tracking(&self) -> bool {
        sync::lock(&self.state).enabled
    }

    /// Start tracking and return a guard that stops it when dropped.
    ///
    /// The guard fires on every exit path, including unwinding.
    pub(crate) fn session(&self) -> TrackingSession<'_> {
        self.start_tracking();
        TrackingSession {
            tracker: self,
            finished: false,
        }
    }
}

/// Active tracking window; see [`DependencyTracker::session`].
pub(crate) struct TrackingSession<'a> {
    tracker: &'a DependencyTracker,
    finished: bool,
}

impl TrackingSession<'_> {
    /// Stop tracking and return the captured paths.
    pub(crate) fn finish(mut self) -> BTreeSet<String> {
        self.finished = true;
        self.tracker.stop_tracking()
    }
}

impl Drop for TrackingSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.stop_tracking();
        }
    }
}
