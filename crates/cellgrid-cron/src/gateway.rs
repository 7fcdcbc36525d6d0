//! Instance-lifecycle gateway.
//!
//! Fire-time actions operate on applications through the cell's
//! instance REST API; that surface is outside this crate and injected
//! behind this trait. The production implementation maps
//! `list_instances` to `GET /instance/?match=<pattern>` and
//! `bulk_delete` to `POST /instance/_bulk/delete` with the trusted-agent
//! header set to `cron`.

/// Effects the cron actions can have on the cell.
pub trait LifecycleGateway: Send + Sync {
    /// Start `count` instances of an application.
    fn start_instances(&self, app: &str, count: u32) -> anyhow::Result<()>;

    /// Resolve the current instances of an application pattern.
    fn list_instances(&self, pattern: &str) -> anyhow::Result<Vec<String>>;

    /// Delete a batch of instances.
    fn bulk_delete(&self, instances: &[String]) -> anyhow::Result<()>;

    /// Set a monitor's desired instance count.
    fn set_monitor_count(&self, monitor: &str, count: u32) -> anyhow::Result<()>;
}
