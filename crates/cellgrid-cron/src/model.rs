//! Event models and the cron API facade.
//!
//! An event model owns one event type end to end: it plans the job
//! (composite name plus fire-time kwargs) at definition time and
//! executes the action at fire time. Models are dispatched through an
//! explicit [`EventRegistry`] keyed by `<topic>:<action>`, so new event
//! kinds register without touching the scheduler.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{CronError, CronResult};
use crate::expr::CronExpr;
use crate::gateway::LifecycleGateway;
use crate::job::{CronJob, JobInfo, build_name, parse_name};
use crate::scheduler::CronScheduler;

/// What a model wants stored for a job: the composite name and the
/// kwargs handed back to [`EventModel::fire`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub name: String,
    pub kwargs: BTreeMap<String, Value>,
}

/// One event type: planning at definition time, action at fire time.
pub trait EventModel: Send + Sync {
    /// Registry key, `<topic>:<action>`.
    fn event(&self) -> &'static str;

    /// Validate inputs and produce the stored job plan.
    fn plan(&self, job_id: &str, resource: &str, count: Option<u32>) -> CronResult<JobPlan>;

    /// Execute the action with the kwargs stored by [`EventModel::plan`].
    fn fire(
        &self,
        kwargs: &BTreeMap<String, Value>,
        gateway: &dyn LifecycleGateway,
    ) -> anyhow::Result<()>;
}

fn require_count(event: &str, count: Option<u32>) -> CronResult<u32> {
    count.ok_or_else(|| CronError::InvalidInput(format!("{event} requires a count")))
}

fn kwarg_str<'a>(kwargs: &'a BTreeMap<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    kwargs
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing kwarg {key:?}"))
}

fn kwarg_count(kwargs: &BTreeMap<String, Value>) -> anyhow::Result<u32> {
    kwargs
        .get("count")
        .and_then(Value::as_u64)
        .map(|n| n as u32)
        .ok_or_else(|| anyhow::anyhow!("missing kwarg \"count\""))
}

/// `app:start` — start N instances of an application.
pub struct AppStart;

impl EventModel for AppStart {
    fn event(&self) -> &'static str {
        "app:start"
    }

    fn plan(&self, job_id: &str, resource: &str, count: Option<u32>) -> CronResult<JobPlan> {
        let count = require_count(self.event(), count)?;
        let mut kwargs = BTreeMap::new();
        kwargs.insert("job_id".to_string(), Value::from(job_id));
        kwargs.insert("app_name".to_string(), Value::from(resource));
        kwargs.insert("count".to_string(), Value::from(count));
        Ok(JobPlan {
            name: build_name(resource, "app", "start", Some(count)),
            kwargs,
        })
    }

    fn fire(
        &self,
        kwargs: &BTreeMap<String, Value>,
        gateway: &dyn LifecycleGateway,
    ) -> anyhow::Result<()> {
        let app = kwarg_str(kwargs, "app_name")?;
        let count = kwarg_count(kwargs)?;
        info!(%app, count, "cron: starting instances");
        gateway.start_instances(app, count)
    }
}

/// `app:stop` — delete all running instances of an application.
pub struct AppStop;

impl EventModel for AppStop {
    fn event(&self) -> &'static str {
        "app:stop"
    }

    fn plan(&self, job_id: &str, resource: &str, _count: Option<u32>) -> CronResult<JobPlan> {
        let mut kwargs = BTreeMap::new();
        kwargs.insert("job_id".to_string(), Value::from(job_id));
        kwargs.insert("app_name".to_string(), Value::from(resource));
        Ok(JobPlan {
            name: build_name(resource, "app", "stop", None),
            kwargs,
        })
    }

    fn fire(
        &self,
        kwargs: &BTreeMap<String, Value>,
        gateway: &dyn LifecycleGateway,
    ) -> anyhow::Result<()> {
        let app = kwarg_str(kwargs, "app_name")?;
        let instances = gateway.list_instances(app)?;
        if instances.is_empty() {
            debug!(%app, "cron: no instances to stop");
            return Ok(());
        }
        info!(%app, count = instances.len(), "cron: stopping instances");
        gateway.bulk_delete(&instances)
    }
}

/// `monitor:set_count` — set a monitor's desired instance count.
pub struct MonitorSetCount;

impl EventModel for MonitorSetCount {
    fn event(&self) -> &'static str {
        "monitor:set_count"
    }

    fn plan(&self, job_id: &str, resource: &str, count: Option<u32>) -> CronResult<JobPlan> {
        let count = require_count(self.event(), count)?;
        let mut kwargs = BTreeMap::new();
        kwargs.insert("job_id".to_string(), Value::from(job_id));
        kwargs.insert("monitor_name".to_string(), Value::from(resource));
        kwargs.insert("count".to_string(), Value::from(count));
        Ok(JobPlan {
            name: build_name(resource, "monitor", "set_count", Some(count)),
            kwargs,
        })
    }

    fn fire(
        &self,
        kwargs: &BTreeMap<String, Value>,
        gateway: &dyn LifecycleGateway,
    ) -> anyhow::Result<()> {
        let monitor = kwarg_str(kwargs, "monitor_name")?;
        let count = kwarg_count(kwargs)?;
        info!(%monitor, count, "cron: setting monitor count");
        gateway.set_monitor_count(monitor, count)
    }
}

/// Registry of event models keyed by `<topic>:<action>`.
pub struct EventRegistry {
    models: HashMap<&'static str, Box<dyn EventModel>>,
}

impl EventRegistry {
    /// Registry with the built-in models.
    pub fn builtin() -> Self {
        let mut registry = Self {
            models: HashMap::new(),
        };
        registry.register(Box::new(AppStart));
        registry.register(Box::new(AppStop));
        registry.register(Box::new(MonitorSetCount));
        registry
    }

    pub fn register(&mut self, model: Box<dyn EventModel>) {
        self.models.insert(model.event(), model);
    }

    /// Look up a model; unknown events are invalid input.
    pub fn get(&self, event: &str) -> CronResult<&dyn EventModel> {
        self.models
            .get(event)
            .map(Box::as_ref)
            .ok_or_else(|| CronError::InvalidInput(format!("unknown event {event:?}")))
    }

    /// Fire a stored job: recover the event from the job name and run
    /// the matching model with the job's kwargs.
    pub fn fire_job(
        &self,
        job: &CronJob,
        gateway: &dyn LifecycleGateway,
    ) -> anyhow::Result<()> {
        let (_, fields) = parse_name(&job.name);
        let (topic, action) = match (fields.get("event"), fields.get("action")) {
            (Some(topic), Some(action)) => (topic, action),
            _ => anyhow::bail!("job {:?} has a malformed name {:?}", job.id, job.name),
        };
        let model = self.get(&format!("{topic}:{action}"))?;
        model.fire(&job.kwargs, gateway)
    }
}

/// API facade over the scheduler and event registry; the shape the REST
/// and CLI surfaces call into.
pub struct CronApi {
    scheduler: CronScheduler,
    registry: Arc<EventRegistry>,
}

impl CronApi {
    pub fn new(scheduler: CronScheduler, registry: Arc<EventRegistry>) -> Self {
        Self {
            scheduler,
            registry,
        }
    }

    /// Create a job for an event on a resource. The id must be new.
    pub fn create(
        &self,
        job_id: &str,
        event: &str,
        resource: &str,
        expression: &str,
        count: Option<u32>,
    ) -> CronResult<JobInfo> {
        if self.scheduler.get_job(job_id)?.is_some() {
            return Err(CronError::Found(job_id.to_string()));
        }
        let plan = self.registry.get(event)?.plan(job_id, resource, count)?;
        let expression = CronExpr::parse(expression)?;
        let job = self
            .scheduler
            .create_job(job_id, plan.name, plan.kwargs, expression)?;
        Ok(JobInfo::from(&job))
    }

    /// Update a job. `pause`/`resume` short-circuit without touching the
    /// definition; otherwise the event/resource/expression replace it,
    /// with a paused job staying paused.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        job_id: &str,
        event: &str,
        resource: &str,
        expression: &str,
        count: Option<u32>,
        pause: bool,
        resume: bool,
    ) -> CronResult<JobInfo> {
        if pause {
            return Ok(JobInfo::from(&self.scheduler.pause_job(job_id)?));
        }
        if resume {
            return Ok(JobInfo::from(&self.scheduler.resume_job(job_id)?));
        }
        let plan = self.registry.get(event)?.plan(job_id, resource, count)?;
        let expression = CronExpr::parse(expression)?;
        let job = self
            .scheduler
            .update_job(job_id, plan.name, plan.kwargs, expression)?;
        Ok(JobInfo::from(&job))
    }

    /// Get a job's wire shape, `None` when absent.
    pub fn get(&self, job_id: &str) -> CronResult<Option<JobInfo>> {
        Ok(self.scheduler.get_job(job_id)?.map(|j| JobInfo::from(&j)))
    }

    /// Delete a job. No-op if absent.
    pub fn delete(&self, job_id: &str) -> CronResult<()> {
        self.scheduler.delete_job(job_id)?;
        Ok(())
    }

    /// List jobs matching the optional id and resource globs.
    pub fn list(
        &self,
        id_match: Option<&str>,
        resource_match: Option<&str>,
    ) -> CronResult<Vec<JobInfo>> {
        Ok(self
            .scheduler
            .list_jobs(id_match, resource_match)?
            .iter()
            .map(JobInfo::from)
            .collect())
    }
}
