//! Watch driver — turns one-shot triggers into continuous watches.
//!
//! The coordination store only offers one-shot triggers; a trigger that
//! has fired observes nothing further. This module owns the re-arming
//! loop: every fire re-arms the trigger, re-reads the watched path, and
//! delivers the fresh value to the callback. Registration delivers the
//! current value immediately, so consumers never start from a blind spot.
//!
//! Each watch is an explicit, cancelable subscription ([`WatchHandle`])
//! rather than a self-re-registering callback closure; cancellation is a
//! flag checked before every delivery, so an already-armed trigger fires
//! into a no-op.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::error::CoordError;
use crate::store::CoordStore;

/// Handle to an active watch. Dropping the handle does not cancel the
/// watch; call [`WatchHandle::cancel`] for that.
pub struct WatchHandle {
    stopped: Arc<AtomicBool>,
}

impl WatchHandle {
    /// Stop the watch. Idempotent; an in-flight fire delivers nothing.
    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the watch is still delivering.
    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

/// Watch the child set of `path`.
///
/// The callback receives the full current child set, once immediately and
/// again after every change, and returns `true` to keep watching.
pub fn watch_children<F>(store: Arc<dyn CoordStore>, path: &str, callback: F) -> WatchHandle
where
    F: FnMut(BTreeSet<String>) -> bool + Send + 'static,
{
    let watch = Arc::new(ChildWatch {
        store,
        path: path.to_string(),
        callback: Mutex::new(callback),
        stopped: Arc::new(AtomicBool::new(false)),
    });
    let handle = WatchHandle {
        stopped: Arc::clone(&watch.stopped),
    };
    fire_child_watch(watch);
    handle
}

/// Watch the data of `path`.
///
/// The callback receives `Some(bytes)` for a live node and `None` once
/// the node is deleted or absent, and returns `true` to keep watching.
pub fn watch_data<F>(store: Arc<dyn CoordStore>, path: &str, callback: F) -> WatchHandle
where
    F: FnMut(Option<Vec<u8>>) -> bool + Send + 'static,
{
    let watch = Arc::new(DataWatch {
        store,
        path: path.to_string(),
        callback: Mutex::new(callback),
        stopped: Arc::new(AtomicBool::new(false)),
    });
    let handle = WatchHandle {
        stopped: Arc::clone(&watch.stopped),
    };
    fire_data_watch(watch);
    handle
}

struct ChildWatch<F> {
    store: Arc<dyn CoordStore>,
    path: String,
    callback: Mutex<F>,
    stopped: Arc<AtomicBool>,
}

struct DataWatch<F> {
    store: Arc<dyn CoordStore>,
    path: String,
    callback: Mutex<F>,
    stopped: Arc<AtomicBool>,
}

fn fire_child_watch<F>(watch: Arc<ChildWatch<F>>)
where
    F: FnMut(BTreeSet<String>) -> bool + Send + 'static,
{
    if watch.stopped.load(Ordering::SeqCst) {
        return;
    }
    // Re-arm before reading: a change landing between the read and the
    // delivery still produces a fire instead of a silent gap.
    let rearm = Arc::clone(&watch);
    if let Err(e) = watch
        .store
        .arm_child_trigger(&watch.path, Box::new(move || fire_child_watch(rearm)))
    {
        fatal(&watch.path, &e);
    }
    let children: BTreeSet<String> = match watch.store.children(&watch.path) {
        Ok(c) => c.into_iter().collect(),
        Err(CoordError::NotFound(_)) => BTreeSet::new(),
        Err(e) => fatal(&watch.path, &e),
    };
    let keep = deliver(&watch.path, || {
        let mut cb = lock(&watch.callback);
        cb(children)
    });
    if !keep {
        debug!(path = %watch.path, "children watch stopped by callback");
        watch.stopped.store(true, Ordering::SeqCst);
    }
}

fn fire_data_watch<F>(watch: Arc<DataWatch<F>>)
where
    F: FnMut(Option<Vec<u8>>) -> bool + Send + 'static,
{
    if watch.stopped.load(Ordering::SeqCst) {
        return;
    }
    let rearm = Arc::clone(&watch);
    if let Err(e) = watch
        .store
        .arm_data_trigger(&watch.path, Box::new(move || fire_data_watch(rearm)))
    {
        fatal(&watch.path, &e);
    }
    let data = match watch.store.get(&watch.path) {
        Ok(d) => d,
        Err(CoordError::NotFound(_)) => None,
        Err(e) => fatal(&watch.path, &e),
    };
    let keep = deliver(&watch.path, || {
        let mut cb = lock(&watch.callback);
        cb(data)
    });
    if !keep {
        debug!(path = %watch.path, "data watch stopped by callback");
        watch.stopped.store(true, Ordering::SeqCst);
    }
}

/// Run a callback under the fail-fast policy: a panic means the cell view
/// is in an unknown state, so the process must not keep running.
fn deliver<T>(path: &str, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            error!(%path, "watch callback panicked, aborting");
            process::abort();
        }
    }
}

fn fatal(path: &str, err: &CoordError) -> ! {
    error!(%path, error = %err, "coordination store failed while servicing watch, aborting");
    process::abort();
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // Callback panics abort, so the mutex can only be poisoned by a panic
    // elsewhere in the process that is already on its way down.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn collect_fires() -> (Arc<Mutex<Vec<BTreeSet<String>>>>, impl FnMut(BTreeSet<String>) -> bool) {
        let fires = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fires);
        (fires, move |children| {
            sink.lock().unwrap().push(children);
            true
        })
    }

    #[test]
    fn children_watch_delivers_immediately() {
        let store = Arc::new(MemoryStore::new());
        store.put("/running/a#1", b"").unwrap();

        let (fires, cb) = collect_fires();
        let _handle = watch_children(store, "/running", cb);

        let fires = fires.lock().unwrap();
        assert_eq!(fires.len(), 1);
        assert!(fires[0].contains("a#1"));
    }

    #[test]
    fn children_watch_refires_on_create_and_delete() {
        let store = Arc::new(MemoryStore::new());
        let (fires, cb) = collect_fires();
        let _handle = watch_children(Arc::clone(&store) as Arc<dyn CoordStore>, "/running", cb);

        store.put("/running/a#1", b"").unwrap();
        store.put("/running/b#2", b"").unwrap();
        store.delete("/running/a#1").unwrap();

        let fires = fires.lock().unwrap();
        assert_eq!(fires.len(), 4);
        assert!(fires[0].is_empty());
        assert_eq!(fires[3].len(), 1);
        assert!(fires[3].contains("b#2"));
    }

    #[test]
    fn children_watch_ignores_data_updates() {
        let store = Arc::new(MemoryStore::new());
        store.put("/running/a#1", b"v1").unwrap();

        let (fires, cb) = collect_fires();
        let _handle = watch_children(Arc::clone(&store) as Arc<dyn CoordStore>, "/running", cb);

        // Overwriting data does not change the child set.
        store.put("/running/a#1", b"v2").unwrap();

        assert_eq!(fires.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancelled_watch_stops_delivering() {
        let store = Arc::new(MemoryStore::new());
        let (fires, cb) = collect_fires();
        let handle = watch_children(Arc::clone(&store) as Arc<dyn CoordStore>, "/running", cb);

        handle.cancel();
        assert!(!handle.is_active());
        store.put("/running/a#1", b"").unwrap();

        assert_eq!(fires.lock().unwrap().len(), 1);
    }

    #[test]
    fn callback_false_stops_watch() {
        let store = Arc::new(MemoryStore::new());
        let fires = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&fires);
        let _handle = watch_children(
            Arc::clone(&store) as Arc<dyn CoordStore>,
            "/running",
            move |_| {
                *sink.lock().unwrap() += 1;
                false
            },
        );

        store.put("/running/a#1", b"").unwrap();
        assert_eq!(*fires.lock().unwrap(), 1);
    }

    #[test]
    fn data_watch_delivers_value_and_deletion() {
        let store = Arc::new(MemoryStore::new());
        store.put("/placement", b"v1").unwrap();

        let fires = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fires);
        let _handle = watch_data(
            Arc::clone(&store) as Arc<dyn CoordStore>,
            "/placement",
            move |data| {
                sink.lock().unwrap().push(data);
                true
            },
        );

        store.put("/placement", b"v2").unwrap();
        store.delete("/placement").unwrap();

        let fires = fires.lock().unwrap();
        assert_eq!(
            *fires,
            vec![Some(b"v1".to_vec()), Some(b"v2".to_vec()), None]
        );
    }

    #[test]
    fn data_watch_on_absent_node_delivers_none_then_value() {
        let store = Arc::new(MemoryStore::new());
        let fires = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fires);
        let _handle = watch_data(
            Arc::clone(&store) as Arc<dyn CoordStore>,
            "/placement",
            move |data| {
                sink.lock().unwrap().push(data);
                true
            },
        );

        store.put("/placement", b"v1").unwrap();

        let fires = fires.lock().unwrap();
        assert_eq!(*fires, vec![None, Some(b"v1".to_vec())]);
    }
}
