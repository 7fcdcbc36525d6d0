//! cellgrid-cron — recurring job scheduling against application lifecycle.
//!
//! Jobs are cron-triggered actions on cell resources: start an
//! application's instances, stop them, or set a monitor count. Job
//! definitions persist in a redb-backed store; the scheduler offers
//! create/update/delete/pause/resume with pause state preserved across
//! updates, and a run loop that fires due triggers with a one-day
//! misfire grace.
//!
//! Event types are dispatched through an explicit registry
//! ([`EventRegistry`]) so new event kinds can be added without touching
//! the scheduler.

pub mod error;
pub mod expr;
pub mod gateway;
pub mod job;
pub mod model;
pub mod scheduler;
pub mod store;

pub use error::{CronError, CronResult};
pub use expr::CronExpr;
pub use gateway::LifecycleGateway;
pub use job::{CronJob, JobInfo};
pub use model::{CronApi, EventModel, EventRegistry, JobPlan};
pub use scheduler::{CronScheduler, MISFIRE_GRACE_SECS};
pub use store::JobStore;
