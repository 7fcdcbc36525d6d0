//! Point and pattern queries over the cell snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use glob::Pattern;

use crate::cell::CellState;
use crate::error::{StateError, StateResult};
use crate::types::StateRecord;

/// Host -> partition directory lookup, injected by the admin layer.
/// Only consulted when a query filters by partition.
pub trait PartitionLookup: Send + Sync {
    fn host_partition(&self, host: &str) -> Option<String>;
}

/// Answers `get` and `list` queries against the shared cell state.
pub struct StateQuery {
    state: Arc<CellState>,
    partitions: Option<Arc<dyn PartitionLookup>>,
}

impl StateQuery {
    pub fn new(state: Arc<CellState>) -> Self {
        Self {
            state,
            partitions: None,
        }
    }

    /// Enable partition filtering via the given directory lookup.
    pub fn with_partitions(mut self, lookup: Arc<dyn PartitionLookup>) -> Self {
        self.partitions = Some(lookup);
        self
    }

    /// Look up one instance. Placement wins while the instance is live;
    /// otherwise the derived finished record is returned.
    pub fn get(&self, instance: &str) -> Option<StateRecord> {
        let snap = self.state.load();
        if let Some(entry) = snap.placement.get(instance) {
            return Some(StateRecord::placed(instance, entry, true));
        }
        snap.finished
            .get(instance)
            .map(|entry| entry.to_record(instance))
    }

    /// List instances matching a glob pattern.
    ///
    /// A missing pattern matches everything; a pattern without a `#`
    /// matches all instances of that app (an implicit `#*` suffix).
    /// Finished instances are included on request and are authoritative
    /// when an id appears in both maps. `partition` restricts the result
    /// to instances whose last-known host belongs to that partition.
    pub fn list(
        &self,
        pattern: Option<&str>,
        finished: bool,
        partition: Option<&str>,
    ) -> StateResult<Vec<StateRecord>> {
        let mut glob = pattern.unwrap_or("*").to_string();
        if !glob.contains('#') {
            glob.push_str("#*");
        }
        let matcher = Pattern::new(&glob)
            .map_err(|e| StateError::InvalidInput(format!("bad pattern {glob:?}: {e}")))?;

        let snap = self.state.load();
        let mut records: BTreeMap<String, StateRecord> = BTreeMap::new();
        for (name, entry) in &snap.placement {
            if matcher.matches(name) {
                records.insert(name.clone(), StateRecord::placed(name, entry, false));
            }
        }
        if finished {
            for (name, entry) in &snap.finished {
                if matcher.matches(name) {
                    records.insert(name.clone(), entry.to_record(name));
                }
            }
        }

        if let Some(partition) = partition {
            let lookup = self.partitions.as_ref().ok_or_else(|| {
                StateError::InvalidInput("partition filtering not configured".to_string())
            })?;
            records.retain(|_, record| {
                record
                    .host
                    .as_deref()
                    .and_then(|host| lookup.host_partition(host))
                    .is_some_and(|p| p == partition)
            });
        }

        Ok(records.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FinishedEntry, InstanceState, PlacementEntry};
    use std::collections::HashMap;

    fn seeded_state() -> Arc<CellState> {
        let state = Arc::new(CellState::new());
        state.update(|snap| {
            snap.running.insert("proid.app#0000000001".to_string());
            snap.placement.insert(
                "proid.app#0000000001".to_string(),
                PlacementEntry {
                    state: InstanceState::Running,
                    host: Some("host1".to_string()),
                    expires: Some(999.5),
                },
            );
            snap.placement.insert(
                "proid.app#0000000002".to_string(),
                PlacementEntry {
                    state: InstanceState::Scheduled,
                    host: Some("host2".to_string()),
                    expires: None,
                },
            );
            snap.placement.insert(
                "proid.other#0000000001".to_string(),
                PlacementEntry {
                    state: InstanceState::Pending,
                    host: None,
                    expires: None,
                },
            );
            snap.finished.insert(
                "proid.app#0000000000".to_string(),
                FinishedEntry {
                    host: Some("host3".to_string()),
                    state: Some(InstanceState::Finished),
                    when: Some("100.0".to_string()),
                    data: Some("1.0".to_string()),
                },
            );
        });
        state
    }

    #[test]
    fn get_placed_instance() {
        let query = StateQuery::new(seeded_state());
        let rec = query.get("proid.app#0000000001").unwrap();
        assert_eq!(rec.state, Some(InstanceState::Running));
        assert_eq!(rec.host.as_deref(), Some("host1"));
        assert_eq!(rec.expires, Some(999.5));
    }

    #[test]
    fn get_finished_instance_is_derived() {
        let query = StateQuery::new(seeded_state());
        let rec = query.get("proid.app#0000000000").unwrap();
        assert_eq!(rec.state, Some(InstanceState::Finished));
        assert_eq!(rec.exitcode, Some(1));
        assert_eq!(rec.oom, Some(false));
    }

    #[test]
    fn get_unknown_is_none() {
        let query = StateQuery::new(seeded_state());
        assert!(query.get("proid.app#9999999999").is_none());
    }

    #[test]
    fn list_defaults_to_everything_live() {
        let query = StateQuery::new(seeded_state());
        let records = query.list(None, false, None).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "proid.app#0000000001",
                "proid.app#0000000002",
                "proid.other#0000000001"
            ]
        );
        // List projection omits expires.
        assert_eq!(records[0].expires, None);
    }

    #[test]
    fn bare_app_pattern_gets_implicit_instance_suffix() {
        let query = StateQuery::new(seeded_state());
        let records = query.list(Some("proid.app"), false, None).unwrap();
        assert_eq!(records.len(), 2);

        // A pattern that already has '#' is used as-is.
        let records = query
            .list(Some("proid.app#0000000001"), false, None)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "proid.app#0000000001");
    }

    #[test]
    fn explicit_pattern_with_hash_does_not_match_suffixed() {
        let state = Arc::new(CellState::new());
        state.update(|snap| {
            snap.placement.insert(
                "foo.bar#0000000001#0".to_string(),
                PlacementEntry {
                    state: InstanceState::Pending,
                    host: None,
                    expires: None,
                },
            );
        });
        let query = StateQuery::new(state);

        // Bare pattern grows '#*' and matches the suffixed id; a pattern
        // that already contains '#' must match exactly.
        assert_eq!(query.list(Some("foo.bar"), false, None).unwrap().len(), 1);
        assert_eq!(
            query
                .list(Some("foo.bar#0000000001"), false, None)
                .unwrap()
                .len(),
            0
        );
        assert_eq!(
            query
                .list(Some("foo.bar#0000000001#0"), false, None)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn list_includes_finished_on_request() {
        let query = StateQuery::new(seeded_state());
        let records = query.list(Some("proid.app"), true, None).unwrap();
        assert_eq!(records.len(), 3);
        let finished = records
            .iter()
            .find(|r| r.name == "proid.app#0000000000")
            .unwrap();
        assert_eq!(finished.exitcode, Some(1));
    }

    #[test]
    fn finished_is_authoritative_on_collision() {
        let state = seeded_state();
        // Stale placement entry for an instance that already finished.
        state.update(|snap| {
            snap.placement.insert(
                "proid.app#0000000000".to_string(),
                PlacementEntry {
                    state: InstanceState::Scheduled,
                    host: Some("host9".to_string()),
                    expires: None,
                },
            );
        });
        let query = StateQuery::new(state);

        let records = query.list(Some("proid.app#0000000000"), true, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, Some(InstanceState::Finished));
        assert_eq!(records[0].host.as_deref(), Some("host3"));
    }

    #[test]
    fn bad_pattern_is_invalid_input() {
        let query = StateQuery::new(seeded_state());
        let err = query.list(Some("proid.[app"), false, None).unwrap_err();
        assert!(matches!(err, StateError::InvalidInput(_)));
    }

    struct StaticPartitions(HashMap<String, String>);

    impl PartitionLookup for StaticPartitions {
        fn host_partition(&self, host: &str) -> Option<String> {
            self.0.get(host).cloned()
        }
    }

    #[test]
    fn partition_filter_joins_against_directory() {
        let lookup = StaticPartitions(HashMap::from([
            ("host1".to_string(), "part-a".to_string()),
            ("host2".to_string(), "part-b".to_string()),
        ]));
        let query = StateQuery::new(seeded_state()).with_partitions(Arc::new(lookup));

        let records = query.list(None, false, Some("part-a")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "proid.app#0000000001");

        // Hostless and unknown-host instances never match a partition.
        let records = query.list(None, false, Some("part-zzz")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn partition_filter_without_lookup_is_invalid() {
        let query = StateQuery::new(seeded_state());
        let err = query.list(None, false, Some("part-a")).unwrap_err();
        assert!(matches!(err, StateError::InvalidInput(_)));
    }
}
