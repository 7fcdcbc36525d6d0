//! The cell snapshot and its publication point.
//!
//! Watcher callbacks run on the coordination client's threads while
//! request threads read concurrently. Rather than lock individual maps,
//! every write clones the current snapshot, mutates the clone, and
//! atomically publishes the new `Arc`. Readers hold a consistent snapshot
//! for as long as they keep the `Arc`, at the cost of a copy per fire.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::types::{FinishedEntry, InstanceState, PlacementEntry};

/// Immutable point-in-time view of a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellSnapshot {
    /// Instances currently running.
    pub running: BTreeSet<String>,
    /// Live placement: instance -> host/expiry/state.
    pub placement: BTreeMap<String, PlacementEntry>,
    /// Exit history: instance -> raw finished record. Merge-only; the
    /// history backfill never overwrites a live-watch entry.
    pub finished: BTreeMap<String, FinishedEntry>,
}

impl CellSnapshot {
    /// Instance ids visible under a given state label, the projection
    /// streamed to delta subscribers.
    pub fn instances_in(&self, state: InstanceState) -> BTreeSet<String> {
        match state {
            InstanceState::Running => self.running.clone(),
            InstanceState::Pending | InstanceState::Scheduled => self
                .placement
                .iter()
                .filter(|(_, e)| e.state == state)
                .map(|(name, _)| name.clone())
                .collect(),
            _ => self
                .finished
                .iter()
                .filter(|(_, e)| e.state == Some(state))
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }
}

/// Shared cell state: written by watcher callbacks, read by queries.
#[derive(Default)]
pub struct CellState {
    current: RwLock<Arc<CellSnapshot>>,
}

impl CellState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current snapshot. Cheap; clones an `Arc`.
    pub fn load(&self) -> Arc<CellSnapshot> {
        Arc::clone(&self.read())
    }

    /// Copy-on-write update: clone, mutate, publish. Writers serialize on
    /// the write lock; readers never observe intermediate state.
    pub fn update(&self, mutate: impl FnOnce(&mut CellSnapshot)) {
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let mut next = (**slot).clone();
        mutate(&mut next);
        *slot = Arc::new(next);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Arc<CellSnapshot>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let state = CellState::new();
        let snap = state.load();
        assert!(snap.running.is_empty());
        assert!(snap.placement.is_empty());
        assert!(snap.finished.is_empty());
    }

    #[test]
    fn update_publishes_new_snapshot() {
        let state = CellState::new();
        let before = state.load();

        state.update(|snap| {
            snap.running.insert("a.b#1".to_string());
        });

        let after = state.load();
        assert!(before.running.is_empty());
        assert!(after.running.contains("a.b#1"));
    }

    #[test]
    fn held_snapshot_is_stable_across_updates() {
        let state = CellState::new();
        state.update(|snap| {
            snap.running.insert("a.b#1".to_string());
        });
        let held = state.load();

        state.update(|snap| {
            snap.running.clear();
        });

        assert!(held.running.contains("a.b#1"));
        assert!(state.load().running.is_empty());
    }

    #[test]
    fn projections_by_state() {
        let state = CellState::new();
        state.update(|snap| {
            snap.running.insert("a.b#1".to_string());
            snap.placement.insert(
                "a.b#1".to_string(),
                PlacementEntry {
                    state: InstanceState::Running,
                    host: Some("h1".to_string()),
                    expires: None,
                },
            );
            snap.placement.insert(
                "a.b#2".to_string(),
                PlacementEntry {
                    state: InstanceState::Scheduled,
                    host: Some("h2".to_string()),
                    expires: None,
                },
            );
            snap.finished.insert(
                "a.b#0".to_string(),
                FinishedEntry {
                    state: Some(InstanceState::Finished),
                    ..FinishedEntry::default()
                },
            );
        });

        let snap = state.load();
        assert_eq!(
            snap.instances_in(InstanceState::Running),
            ["a.b#1".to_string()].into()
        );
        assert_eq!(
            snap.instances_in(InstanceState::Scheduled),
            ["a.b#2".to_string()].into()
        );
        assert_eq!(
            snap.instances_in(InstanceState::Finished),
            ["a.b#0".to_string()].into()
        );
    }
}
