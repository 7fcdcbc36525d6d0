//! In-memory coordination store.
//!
//! A single-process `CoordStore` used by tests and embedded deployments.
//! Mutations fire armed one-shot triggers: data triggers on the node
//! itself, child triggers on its parent when the child set changes.
//! Triggers run on the mutating thread, after the store lock is released,
//! so trigger bodies are free to re-arm.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::CoordResult;
use crate::store::{CoordStore, Trigger};

/// In-memory hierarchical node store with one-shot triggers.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Vec<u8>>,
    child_triggers: HashMap<String, Vec<Trigger>>,
    data_triggers: HashMap<String, Vec<Trigger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a node. Fires data triggers on the node and,
    /// when the node is new, child triggers on its parent.
    pub fn put(&self, path: &str, data: &[u8]) -> CoordResult<()> {
        let fired = {
            let mut inner = self.lock();
            let created = inner.nodes.insert(path.to_string(), data.to_vec()).is_none();
            let mut fired = inner.data_triggers.remove(path).unwrap_or_default();
            if created {
                fired.extend(
                    inner
                        .child_triggers
                        .remove(parent(path))
                        .unwrap_or_default(),
                );
            }
            fired
        };
        run(fired);
        Ok(())
    }

    /// Delete a node. Fires data triggers on the node and child triggers
    /// on its parent. No-op if the node does not exist.
    pub fn delete(&self, path: &str) -> CoordResult<()> {
        let fired = {
            let mut inner = self.lock();
            if inner.nodes.remove(path).is_none() {
                return Ok(());
            }
            let mut fired = inner.data_triggers.remove(path).unwrap_or_default();
            fired.extend(
                inner
                    .child_triggers
                    .remove(parent(path))
                    .unwrap_or_default(),
            );
            fired
        };
        run(fired);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CoordStore for MemoryStore {
    fn get(&self, path: &str) -> CoordResult<Option<Vec<u8>>> {
        Ok(self.lock().nodes.get(path).cloned())
    }

    fn children(&self, path: &str) -> CoordResult<Vec<String>> {
        let prefix = format!("{path}/");
        let inner = self.lock();
        Ok(inner
            .nodes
            .keys()
            .filter_map(|k| {
                let rest = k.strip_prefix(&prefix)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    fn arm_child_trigger(&self, path: &str, trigger: Trigger) -> CoordResult<()> {
        self.lock()
            .child_triggers
            .entry(path.to_string())
            .or_default()
            .push(trigger);
        Ok(())
    }

    fn arm_data_trigger(&self, path: &str, trigger: Trigger) -> CoordResult<()> {
        self.lock()
            .data_triggers
            .entry(path.to_string())
            .or_default()
            .push(trigger);
        Ok(())
    }
}

/// Parent path of a node ("/a/b" -> "/a", "/a" -> "").
fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

/// Fire a batch of one-shot triggers outside the store lock.
fn run(triggers: Vec<Trigger>) {
    for trigger in triggers {
        trigger();
    }
}
