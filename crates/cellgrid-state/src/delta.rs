//! Delta computation for streaming subscribers.
//!
//! Streaming handlers push incremental created/deleted instance sets
//! instead of full snapshots. The notifier remembers the previous
//! projection and suppresses empty deltas; subscribers must never
//! receive a no-op message.

use std::collections::BTreeSet;

use serde::Serialize;

/// Instances created and deleted between two snapshot projections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDelta {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// Compute the delta between two projections of the cell state.
pub fn diff(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> StateDelta {
    StateDelta {
        created: current.difference(previous).cloned().collect(),
        deleted: previous.difference(current).cloned().collect(),
    }
}

/// Stateful wrapper around [`diff`] for a single subscriber: feeds each
/// non-empty delta to the sink and remembers the projection.
pub struct DeltaNotifier<F> {
    previous: BTreeSet<String>,
    sink: F,
}

impl<F: FnMut(&StateDelta)> DeltaNotifier<F> {
    pub fn new(sink: F) -> Self {
        Self {
            previous: BTreeSet::new(),
            sink,
        }
    }

    /// Observe a new projection. Returns whether a delta was emitted.
    pub fn observe(&mut self, current: BTreeSet<String>) -> bool {
        let delta = diff(&self.previous, &current);
        self.previous = current;
        if delta.is_empty() {
            return false;
        }
        (self.sink)(&delta);
        true
    }
}
