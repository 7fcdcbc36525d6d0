//! Job definition, the job-name codec, and the wire shape.
//!
//! A job's name encodes what it acts on:
//! `<resource>:event=<topic>:action=<action>[:count=<n>]`. The wire shape
//! ([`JobInfo`]) returned to REST and CLI surfaces flattens the parsed
//! name fields next to the id/expression/next-run columns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::CronExpr;

/// A persisted recurring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    /// Composite name, see [`build_name`].
    pub name: String,
    pub expression: CronExpr,
    /// Arguments handed to the event action at fire time.
    pub kwargs: BTreeMap<String, Value>,
    pub paused: bool,
    /// Next fire time; always null while paused.
    pub next_run_time: Option<DateTime<Utc>>,
}

/// Build a composite job name.
pub fn build_name(resource: &str, topic: &str, action: &str, count: Option<u32>) -> String {
    let mut name = format!("{resource}:event={topic}:action={action}");
    if let Some(count) = count {
        name.push_str(&format!(":count={count}"));
    }
    name
}

/// Parse a composite job name back into the resource and its key/value
/// fields. Unrecognized segments are ignored.
pub fn parse_name(name: &str) -> (String, BTreeMap<String, String>) {
    let mut parts = name.split(':');
    let resource = parts.next().unwrap_or_default().to_string();
    let fields = parts
        .filter_map(|part| {
            part.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect();
    (resource, fields)
}

/// Wire shape returned by the REST and CLI surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub resource: String,
    pub expression: String,
    pub next_run_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Remaining fields parsed from the job name (event, action, count..).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl From<&CronJob> for JobInfo {
    fn from(job: &CronJob) -> Self {
        let (resource, fields) = parse_name(&job.name);
        let extra = fields
            .into_iter()
            .map(|(k, v)| {
                // Numeric name fields (count) surface as numbers.
                let value = v
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or(Value::String(v));
                (k, value)
            })
            .collect();
        Self {
            id: job.id.clone(),
            name: job.name.clone(),
            resource,
            expression: job.expression.expression(),
            next_run_time: job.next_run_time,
            timezone: job.expression.timezone.clone(),
            extra,
        }
    }
}
