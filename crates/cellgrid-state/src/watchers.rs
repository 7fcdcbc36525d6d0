//! The four cell watchers.
//!
//! Each watcher owns exactly one field of the cell snapshot and is
//! installed once by [`CellObserver::attach`]:
//!
//! - running: children watch, wholesale replace of the running set plus
//!   re-derivation of every placement entry's state label.
//! - finished: children watch, merge-only point reads of unseen records.
//! - placement: data watch on one compressed blob, full rebuild on every
//!   fire (the source of truth always delivers a complete snapshot).
//! - finished-history: children watch over compressed snapshot blobs,
//!   first-write-wins backfill of the finished map.
//!
//! Per-record I/O races (a node vanishing between the children list and
//! the point read) are skipped; the next fire reconciles. A corrupt
//! placement blob is fatal: the cell view would be unknown.

use std::collections::HashSet;
use std::process;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use cellgrid_coord::blob;
use cellgrid_coord::error::{CoordError, CoordResult};
use cellgrid_coord::store::CoordStore;
use cellgrid_coord::watch::{WatchHandle, watch_children, watch_data};

use crate::cell::CellState;
use crate::types::{FinishedEntry, InstanceState, PlacementEntry};

/// Coordination-store paths watched for one cell.
#[derive(Debug, Clone)]
pub struct CellPaths {
    pub running: String,
    pub finished: String,
    pub finished_history: String,
    pub placement: String,
}

impl Default for CellPaths {
    fn default() -> Self {
        Self {
            running: "/running".to_string(),
            finished: "/finished".to_string(),
            finished_history: "/finished.history".to_string(),
            placement: "/placement".to_string(),
        }
    }
}

/// Directory prefix stripped from history snapshot row paths to recover
/// the instance id.
const HISTORY_ROW_PREFIX: &str = "/finished/";

/// Placement blob row: `[instance, before_host, before_expiry, after_host,
/// after_expiry]`.
type PlacementRow = (String, Option<String>, Option<f64>, Option<String>, Option<f64>);

/// History snapshot row: `[path, data]`.
type HistoryRow = (String, Option<String>);

/// Installs the cell watchers and keeps them fed into a [`CellState`].
pub struct CellObserver {
    store: Arc<dyn CoordStore>,
    state: Arc<CellState>,
    paths: CellPaths,
}

impl CellObserver {
    pub fn new(store: Arc<dyn CoordStore>, state: Arc<CellState>) -> Self {
        Self {
            store,
            state,
            paths: CellPaths::default(),
        }
    }

    /// Override the watched paths.
    pub fn with_paths(mut self, paths: CellPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Install all four watchers. Each delivers the current value
    /// immediately, so the state is primed on return.
    pub fn attach(&self) -> Vec<WatchHandle> {
        vec![
            self.watch_running(),
            self.watch_finished(),
            self.watch_placement(),
            self.watch_finished_history(),
        ]
    }

    /// Children watch on the running directory. Replaces the running set
    /// and re-derives the state label of every placement entry; hosts are
    /// untouched and no entry is dropped.
    fn watch_running(&self) -> WatchHandle {
        let state = Arc::clone(&self.state);
        watch_children(Arc::clone(&self.store), &self.paths.running, move |children| {
            state.update(|snap| {
                snap.running = children;
                for (name, entry) in snap.placement.iter_mut() {
                    entry.state = placement_state(&snap.running, name, entry.host.as_deref());
                }
            });
            true
        })
    }

    /// Children watch on the finished directory. Point-reads every child
    /// not yet known and merges it in; never removes entries.
    fn watch_finished(&self) -> WatchHandle {
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let dir = self.paths.finished.clone();
        watch_children(Arc::clone(&self.store), &self.paths.finished, move |children| {
            let known = state.load();
            let mut inserts = Vec::new();
            for child in children {
                if known.finished.contains_key(&child) {
                    continue;
                }
                let entry = match store.get(&format!("{dir}/{child}")) {
                    Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                        Ok(entry) => entry,
                        Err(e) => {
                            warn!(instance = %child, error = %e, "bad finished record, skipping");
                            continue;
                        }
                    },
                    // Vanished between listing and read: record the exit
                    // with no detail rather than losing the instance.
                    Ok(None) => FinishedEntry::default(),
                    Err(e) => {
                        warn!(instance = %child, error = %e, "finished record read failed, skipping");
                        continue;
                    }
                };
                inserts.push((child, entry));
            }
            if !inserts.is_empty() {
                state.update(|snap| {
                    for (name, entry) in inserts {
                        snap.finished.entry(name).or_insert(entry);
                    }
                });
            }
            true
        })
    }

    /// Data watch on the placement blob. A deleted blob clears the
    /// placement map; otherwise the map is rebuilt from scratch, so
    /// instances absent from the new payload are dropped.
    fn watch_placement(&self) -> WatchHandle {
        let state = Arc::clone(&self.state);
        let path = self.paths.placement.clone();
        watch_data(Arc::clone(&self.store), &self.paths.placement, move |data| {
            let Some(bytes) = data else {
                state.update(|snap| snap.placement.clear());
                return true;
            };
            let rows = match decode_placement(&bytes) {
                Ok(rows) => rows,
                Err(e) => {
                    // Not a per-record race: the complete placement
                    // snapshot is unreadable and the cell view unknown.
                    error!(%path, error = %e, "corrupt placement blob, aborting");
                    process::abort();
                }
            };
            state.update(|snap| {
                snap.placement = rows
                    .into_iter()
                    .map(|(name, _, _, after_host, after_expiry)| {
                        let label = placement_state(&snap.running, &name, after_host.as_deref());
                        (
                            name,
                            PlacementEntry {
                                state: label,
                                host: after_host,
                                expires: after_expiry,
                            },
                        )
                    })
                    .collect();
            });
            true
        })
    }

    /// Children watch on the finished-history directory. Loads each
    /// snapshot blob once (process-local seen set) and backfills finished
    /// entries, never overwriting one already present.
    fn watch_finished_history(&self) -> WatchHandle {
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let dir = self.paths.finished_history.clone();
        let seen: Arc<Mutex<HashSet<String>>> = Arc::default();
        watch_children(
            Arc::clone(&self.store),
            &self.paths.finished_history,
            move |children| {
                let unseen: Vec<String> = {
                    let mut seen = seen.lock().unwrap_or_else(|e| e.into_inner());
                    children
                        .into_iter()
                        .filter(|name| seen.insert(name.clone()))
                        .collect()
                };
                let mut inserts = Vec::new();
                for name in &unseen {
                    let bytes = match store.get(&format!("{dir}/{name}")) {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => {
                            debug!(snapshot = %name, "history snapshot vanished before read");
                            continue;
                        }
                        Err(e) => {
                            warn!(snapshot = %name, error = %e, "history snapshot read failed, skipping");
                            continue;
                        }
                    };
                    let rows = match decode_history(&bytes) {
                        Ok(rows) => rows,
                        Err(e) => {
                            warn!(snapshot = %name, error = %e, "bad history snapshot, skipping");
                            continue;
                        }
                    };
                    for (row_path, data) in rows {
                        let Some(id) = row_path.strip_prefix(HISTORY_ROW_PREFIX) else {
                            continue;
                        };
                        let entry = match data {
                            Some(raw) => match serde_json::from_str(&raw) {
                                Ok(entry) => entry,
                                Err(e) => {
                                    warn!(instance = %id, error = %e, "bad history record, skipping");
                                    continue;
                                }
                            },
                            None => FinishedEntry::default(),
                        };
                        inserts.push((id.to_string(), entry));
                    }
                }
                if !inserts.is_empty() {
                    state.update(|snap| {
                        for (name, entry) in inserts {
                            snap.finished.entry(name).or_insert(entry);
                        }
                    });
                }
                true
            },
        )
    }
}

/// State label for a placement entry: pending without a host, otherwise
/// running iff the instance is in the running set.
fn placement_state(
    running: &std::collections::BTreeSet<String>,
    name: &str,
    host: Option<&str>,
) -> InstanceState {
    match host {
        None => InstanceState::Pending,
        Some(_) if running.contains(name) => InstanceState::Running,
        Some(_) => InstanceState::Scheduled,
    }
}

fn decode_placement(bytes: &[u8]) -> CoordResult<Vec<PlacementRow>> {
    let raw = blob::inflate(bytes)?;
    serde_json::from_slice(&raw).map_err(|e| CoordError::Decode(e.to_string()))
}

fn decode_history(bytes: &[u8]) -> CoordResult<Vec<HistoryRow>> {
    let raw = blob::inflate(bytes)?;
    serde_json::from_slice(&raw).map_err(|e| CoordError::Decode(e.to_string()))
}
