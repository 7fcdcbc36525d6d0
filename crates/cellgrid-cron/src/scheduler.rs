//! CronScheduler — lifecycle operations on persistent recurring jobs.
//!
//! A job is either Active (`next_run_time` set) or Paused
//! (`next_run_time` null). Creation yields an Active job; updates
//! replace trigger and payload but re-apply a pre-existing Paused state;
//! pause/resume toggle without touching trigger or payload.
//!
//! The run loop fires due Active jobs. A trigger missed while the
//! scheduler was down still fires after restart, up to the misfire
//! grace; beyond that it is skipped and the trigger advances.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use glob::Pattern;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{CronError, CronResult};
use crate::expr::CronExpr;
use crate::job::{CronJob, parse_name};
use crate::store::JobStore;

/// How late a missed trigger may still fire, in seconds (one day).
pub const MISFIRE_GRACE_SECS: i64 = 24 * 60 * 60;

fn misfire_grace() -> TimeDelta {
    TimeDelta::seconds(MISFIRE_GRACE_SECS)
}

/// Scheduler over a persistent job store.
#[derive(Clone)]
pub struct CronScheduler {
    store: JobStore,
}

impl CronScheduler {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    /// Get a job by id. Missing jobs are `None`, never an error.
    pub fn get_job(&self, job_id: &str) -> CronResult<Option<CronJob>> {
        self.store.get(job_id)
    }

    /// Create a new Active job. Fails with [`CronError::Found`] if the
    /// id is already present; the check and insert are atomic.
    pub fn create_job(
        &self,
        job_id: &str,
        name: String,
        kwargs: BTreeMap<String, Value>,
        expression: CronExpr,
    ) -> CronResult<CronJob> {
        let next_run_time = expression.next_fire(Utc::now())?;
        let job = CronJob {
            id: job_id.to_string(),
            name,
            expression,
            kwargs,
            paused: false,
            next_run_time,
        };
        if !self.store.insert_new(&job)? {
            return Err(CronError::Found(job_id.to_string()));
        }
        info!(%job_id, name = %job.name, "job created");
        Ok(job)
    }

    /// Replace a job's name, payload, and trigger. A job that was Paused
    /// stays Paused; everything else about it changes.
    pub fn update_job(
        &self,
        job_id: &str,
        name: String,
        kwargs: BTreeMap<String, Value>,
        expression: CronExpr,
    ) -> CronResult<CronJob> {
        let existing = self
            .store
            .get(job_id)?
            .ok_or_else(|| CronError::NotFound(job_id.to_string()))?;
        let was_paused = existing.paused;

        let mut job = CronJob {
            id: job_id.to_string(),
            name,
            expression,
            kwargs,
            paused: false,
            next_run_time: None,
        };
        if !was_paused {
            job.next_run_time = job.expression.next_fire(Utc::now())?;
        } else {
            job.paused = true;
        }
        self.store.put(&job)?;
        info!(%job_id, paused = job.paused, "job updated");
        Ok(job)
    }

    /// Delete a job. No-op if absent.
    pub fn delete_job(&self, job_id: &str) -> CronResult<bool> {
        self.store.delete(job_id)
    }

    /// Pause a job: clears `next_run_time`, keeps trigger and payload.
    pub fn pause_job(&self, job_id: &str) -> CronResult<CronJob> {
        let mut job = self
            .store
            .get(job_id)?
            .ok_or_else(|| CronError::NotFound(job_id.to_string()))?;
        job.paused = true;
        job.next_run_time = None;
        self.store.put(&job)?;
        info!(%job_id, "job paused");
        Ok(job)
    }

    /// Resume a paused job: recomputes `next_run_time` from the trigger.
    pub fn resume_job(&self, job_id: &str) -> CronResult<CronJob> {
        let mut job = self
            .store
            .get(job_id)?
            .ok_or_else(|| CronError::NotFound(job_id.to_string()))?;
        job.paused = false;
        job.next_run_time = job.expression.next_fire(Utc::now())?;
        self.store.put(&job)?;
        info!(%job_id, "job resumed");
        Ok(job)
    }

    /// List jobs, ordered by id. With no filters, everything; otherwise
    /// the union of jobs whose id matches `id_match` and jobs whose
    /// resource (from the job name) matches `resource_match`.
    pub fn list_jobs(
        &self,
        id_match: Option<&str>,
        resource_match: Option<&str>,
    ) -> CronResult<Vec<CronJob>> {
        let jobs = self.store.list()?;
        if id_match.is_none() && resource_match.is_none() {
            return Ok(jobs);
        }

        let id_pattern = compile(id_match)?;
        let resource_pattern = compile(resource_match)?;
        Ok(jobs
            .into_iter()
            .filter(|job| {
                let by_id = id_pattern.as_ref().is_some_and(|p| p.matches(&job.id));
                let by_resource = resource_pattern
                    .as_ref()
                    .is_some_and(|p| p.matches(&parse_name(&job.name).0));
                by_id || by_resource
            })
            .collect())
    }

    /// Fire every Active job due at `now`, invoking `runner` for each.
    ///
    /// Triggers overdue beyond the misfire grace are skipped. Either way
    /// the trigger advances past `now`. Runner failures are logged and
    /// never stop the sweep. Returns the number of jobs fired.
    pub fn fire_due_at(
        &self,
        now: DateTime<Utc>,
        runner: &dyn Fn(&CronJob) -> anyhow::Result<()>,
    ) -> CronResult<u32> {
        let mut fired = 0;
        for mut job in self.store.list()? {
            if job.paused {
                continue;
            }
            let Some(due) = job.next_run_time else {
                continue;
            };
            if due > now {
                continue;
            }
            if now - due <= misfire_grace() {
                debug!(job_id = %job.id, %due, "firing job");
                if let Err(e) = runner(&job) {
                    warn!(job_id = %job.id, error = %e, "job action failed");
                }
                fired += 1;
            } else {
                warn!(job_id = %job.id, %due, "missed fire beyond grace period, skipping");
            }
            job.next_run_time = job.expression.next_fire(now)?;
            self.store.put(&job)?;
        }
        Ok(fired)
    }

    /// Drive the scheduler until shutdown: sweep due jobs every `tick`.
    pub async fn run(
        &self,
        tick: Duration,
        runner: impl Fn(&CronJob) -> anyhow::Result<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> CronResult<()> {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.fire_due_at(Utc::now(), &runner)?;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cron scheduler stopping");
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn compile(pattern: Option<&str>) -> CronResult<Option<Pattern>> {
    pattern
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| CronError::InvalidInput(format!("bad pattern {p:?}: {e}")))
        })
        .transpose()
}
