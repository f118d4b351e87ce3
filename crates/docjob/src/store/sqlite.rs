//! SQLite-backed job store.

use std::collections::BTreeMap;

use super::{seal_update, JobQuery, JobStore, Mutator};
use crate::db::job_repo::{self, JobRow};
use crate::db::Database;
use crate::error::JobError;
use crate::model::{JobRecord, JobStatus};

/// Upper bound on compare-and-swap rounds for one update.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Persistent job store.
///
/// `update` is optimistic: it reads the row, runs the mutator, then writes
/// with `WHERE version = <read version>`. Losing the race re-reads and
/// re-runs the mutator against the fresher record.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn load(&self, id: &str) -> Result<Option<JobRecord>, JobError> {
        match job_repo::find_by_id(&self.db, id)? {
            Some(row) => Ok(Some(row.into_record()?)),
            None => Ok(None),
        }
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, record: JobRecord) -> Result<JobRecord, JobError> {
        let row = JobRow::from_record(&record);
        if job_repo::insert(&self.db, &row)? {
            // Hand back what a later read returns (millisecond timestamps).
            Ok(row.into_record()?)
        } else {
            Err(JobError::AlreadyExists { job_id: record.id })
        }
    }

    fn get(&self, id: &str) -> Result<JobRecord, JobError> {
        self.load(id)?.ok_or_else(|| JobError::not_found(id))
    }

    fn update(&self, id: &str, mutator: &mut Mutator<'_>) -> Result<JobRecord, JobError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.load(id)?.ok_or_else(|| JobError::not_found(id))?;
            let next = seal_update(&current, mutator(&current)?);

            let row = JobRow::from_record(&next);
            let expected = i64::try_from(current.version).unwrap_or(i64::MAX);
            if job_repo::update_if_version(&self.db, &row, expected)? {
                return Ok(row.into_record()?);
            }

            log::debug!(
                "Version conflict updating job {} (attempt {}/{}), retrying",
                id,
                attempt,
                MAX_CAS_ATTEMPTS
            );
        }

        log::warn!(
            "Giving up on job {} after {} conflicting updates",
            id,
            MAX_CAS_ATTEMPTS
        );
        Err(JobError::StoreUnavailable(format!(
            "update of job {} kept conflicting with concurrent writers",
            id
        )))
    }

    fn delete(&self, id: &str) -> Result<JobRecord, JobError> {
        let current = self.get(id)?;
        if job_repo::delete(&self.db, id)? {
            Ok(current)
        } else {
            Err(JobError::not_found(id))
        }
    }

    fn query(&self, query: &JobQuery) -> Result<Vec<JobRecord>, JobError> {
        let rows = job_repo::query(&self.db, &query.to_filter())?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_record() {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable job row: {}", e),
            }
        }
        Ok(records)
    }

    fn status_counts(&self) -> Result<BTreeMap<JobStatus, u64>, JobError> {
        let mut counts = BTreeMap::new();
        for (status, count) in job_repo::count_by_status(&self.db)? {
            match status.parse::<JobStatus>() {
                Ok(status) => {
                    counts.insert(status, count);
                }
                Err(e) => log::warn!("Ignoring {} rows: {}", count, e),
            }
        }
        Ok(counts)
    }

    fn average_processing_time_by_tool(&self) -> Result<BTreeMap<String, f64>, JobError> {
        Ok(job_repo::average_processing_time_by_tool(&self.db)?
            .into_iter()
            .collect())
    }
}
