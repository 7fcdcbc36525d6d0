//! JobStore — redb-backed persistence for cron job definitions.
//!
//! Jobs are JSON-serialized into a single `&str -> &[u8]` table keyed by
//! job id. The store supports both on-disk and in-memory backends (the
//! latter for testing). redb's write transactions serialize concurrent
//! mutations, which is what gives [`JobStore::insert_new`] its
//! check-then-insert atomicity.

use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{CronError, CronResult};
use crate::job::CronJob;

/// Job definitions keyed by job id.
const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

fn store_err(e: impl Display) -> CronError {
    CronError::Store(e.to_string())
}

/// Thread-safe persistent job store.
#[derive(Clone)]
pub struct JobStore {
    db: Arc<Database>,
}

impl JobStore {
    /// Open (or create) a persistent job store at the given path.
    pub fn open(path: &Path) -> CronResult<Self> {
        let db = Database::create(path).map_err(store_err)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "job store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory job store (for testing).
    pub fn open_in_memory() -> CronResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(store_err)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory job store opened");
        Ok(store)
    }

    fn ensure_table(&self) -> CronResult<()> {
        let txn = self.db.begin_write().map_err(store_err)?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(JOBS).map_err(store_err)?;
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Insert a job only if its id is not yet present. Returns whether
    /// the insert happened; the check and insert are one transaction.
    pub fn insert_new(&self, job: &CronJob) -> CronResult<bool> {
        let value = serde_json::to_vec(job).map_err(store_err)?;
        let txn = self.db.begin_write().map_err(store_err)?;
        let inserted;
        {
            let mut table = txn.open_table(JOBS).map_err(store_err)?;
            let existing = table.get(job.id.as_str()).map_err(store_err)?.is_some();
            if existing {
                inserted = false;
            } else {
                table
                    .insert(job.id.as_str(), value.as_slice())
                    .map_err(store_err)?;
                inserted = true;
            }
        }
        txn.commit().map_err(store_err)?;
        Ok(inserted)
    }

    /// Insert or replace a job.
    pub fn put(&self, job: &CronJob) -> CronResult<()> {
        let value = serde_json::to_vec(job).map_err(store_err)?;
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = txn.open_table(JOBS).map_err(store_err)?;
            table
                .insert(job.id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Get a job by id.
    pub fn get(&self, job_id: &str) -> CronResult<Option<CronJob>> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let table = txn.open_table(JOBS).map_err(store_err)?;
        match table.get(job_id).map_err(store_err)? {
            Some(guard) => {
                let job: CronJob = serde_json::from_slice(guard.value()).map_err(store_err)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// List all jobs, ordered by id.
    pub fn list(&self) -> CronResult<Vec<CronJob>> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let table = txn.open_table(JOBS).map_err(store_err)?;
        let mut jobs = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, value) = entry.map_err(store_err)?;
            let job: CronJob = serde_json::from_slice(value.value()).map_err(store_err)?;
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Delete a job by id. Returns true if it existed.
    pub fn delete(&self, job_id: &str) -> CronResult<bool> {
        let txn = self.db.begin_write().map_err(store_err)?;
        let existed;
        {
            let mut table = txn.open_table(JOBS).map_err(store_err)?;
            existed = table.remove(job_id).map_err(store_err)?.is_some();
        }
        txn.commit().map_err(store_err)?;
        debug!(%job_id, existed, "job deleted");
        Ok(existed)
    }
}
