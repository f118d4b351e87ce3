//! In-memory job store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{seal_update, JobQuery, JobStore, Mutator};
use crate::error::JobError;
use crate::model::{JobRecord, JobStatus};

/// Job store holding every record in a `RwLock<HashMap>`.
///
/// Updates run the mutator under the write lock, which makes each update
/// linearizable. Mutators are pure record transforms, so the lock is held
/// only briefly.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Memory job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, record: JobRecord) -> Result<JobRecord, JobError> {
        let mut jobs = self.write();
        if jobs.contains_key(&record.id) {
            return Err(JobError::AlreadyExists { job_id: record.id });
        }
        jobs.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn get(&self, id: &str) -> Result<JobRecord, JobError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::not_found(id))
    }

    fn update(&self, id: &str, mutator: &mut Mutator<'_>) -> Result<JobRecord, JobError> {
        let mut jobs = self.write();
        let current = jobs.get(id).ok_or_else(|| JobError::not_found(id))?;
        let next = seal_update(current, mutator(current)?);
        jobs.insert(id.to_string(), next.clone());
        Ok(next)
    }

    fn delete(&self, id: &str) -> Result<JobRecord, JobError> {
        self.write().remove(id).ok_or_else(|| JobError::not_found(id))
    }

    fn query(&self, query: &JobQuery) -> Result<Vec<JobRecord>, JobError> {
        Ok(query.apply(self.read().values()))
    }

    fn status_counts(&self) -> Result<BTreeMap<JobStatus, u64>, JobError> {
        let mut counts = BTreeMap::new();
        for job in self.read().values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn average_processing_time_by_tool(&self) -> Result<BTreeMap<String, f64>, JobError> {
        let mut totals: BTreeMap<String, (i64, u32)> = BTreeMap::new();
        for job in self.read().values() {
            if job.status != JobStatus::Completed {
                continue;
            }
            if let Some(ms) = job.processing_time_ms {
                let entry = totals.entry(job.tool_name.clone()).or_insert((0, 0));
                entry.0 += ms;
                entry.1 += 1;
            }
        }
        Ok(totals
            .into_iter()
            .map(|(tool, (sum, n))| (tool, sum as f64 / f64::from(n)))
            .collect())
    }
}
