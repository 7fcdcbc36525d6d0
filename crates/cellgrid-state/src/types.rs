//! Domain types for the cell state view.
//!
//! Instances are identified as `<proid>.<app>#<sequence>`. Placement
//! entries label live instances, finished entries record exits. All
//! types serialize to/from the JSON used in coordination-store nodes.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle state of an instance, live or finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Scheduled,
    Running,
    Finished,
    Killed,
    Terminated,
    Aborted,
}

/// Placement of a live instance: where it runs (or will run) and until when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementEntry {
    pub state: InstanceState,
    pub host: Option<String>,
    /// Placement lease expiry, epoch seconds.
    pub expires: Option<f64>,
}

/// Raw finished-instance record as stored in the coordination store.
///
/// A node that vanished mid-read yields an all-empty record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinishedEntry {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub state: Option<InstanceState>,
    /// Exit time, epoch seconds as string.
    #[serde(default)]
    pub when: Option<String>,
    /// Raw exit payload: `"<rc>.<signal>"`, `"oom"`, an error class name,
    /// or absent.
    #[serde(default)]
    pub data: Option<String>,
}

/// Client-facing state record returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRecord {
    pub name: String,
    pub state: Option<InstanceState>,
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exitcode: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i64>,
}

impl StateRecord {
    /// Record for a live (placed) instance.
    pub fn placed(name: &str, entry: &PlacementEntry, with_expires: bool) -> Self {
        Self {
            name: name.to_string(),
            state: Some(entry.state),
            host: entry.host.clone(),
            expires: if with_expires { entry.expires } else { None },
            when: None,
            oom: None,
            exitcode: None,
            signal: None,
        }
    }
}

impl FinishedEntry {
    /// Derive the client-facing record for a finished instance.
    ///
    /// `oom` is true only for a kill with an `"oom"` payload. A normal
    /// exit carries `"<rc>.<signal>"`; an rc above 255 flags signal death
    /// and the record exposes `signal` instead of `exitcode`. An
    /// unparseable payload exposes neither.
    pub fn to_record(&self, name: &str) -> StateRecord {
        let oom = self.state == Some(InstanceState::Killed)
            && self.data.as_deref() == Some("oom");

        let mut record = StateRecord {
            name: name.to_string(),
            state: self.state,
            host: self.host.clone(),
            expires: None,
            when: self.when.clone(),
            oom: Some(oom),
            exitcode: None,
            signal: None,
        };

        if self.state == Some(InstanceState::Finished) {
            if let Some(data) = &self.data {
                match parse_exit_payload(data) {
                    Some((rc, sig)) => {
                        if rc > 255 {
                            record.signal = Some(sig);
                        } else {
                            record.exitcode = Some(rc);
                        }
                    }
                    None => {
                        warn!(instance = %name, %data, "unparseable exit payload");
                    }
                }
            }
        }

        record
    }
}

/// Parse an `"<rc>.<signal>"` exit payload.
fn parse_exit_payload(data: &str) -> Option<(i64, i64)> {
    let (rc, sig) = data.split_once('.')?;
    Some((rc.parse().ok()?, sig.parse().ok()?))
}
