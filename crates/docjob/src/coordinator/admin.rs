//! Read-only queries for dashboards and operators.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::JobCoordinator;
use crate::error::JobError;
use crate::model::{JobRecord, JobStatus};
use crate::store::{JobPredicate, JobQuery};

/// Aggregate view over all stored jobs.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    pub counts: BTreeMap<JobStatus, u64>,
    pub total: u64,
    /// Mean `processing_time_ms` of COMPLETED jobs, per tool.
    pub average_processing_ms_by_tool: BTreeMap<String, f64>,
}

impl JobStatistics {
    pub fn count(&self, status: JobStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

impl JobCoordinator {
    pub fn list(&self, query: &JobQuery) -> Result<Vec<JobRecord>, JobError> {
        self.store.query(query)
    }

    pub fn jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, JobError> {
        self.list(&JobQuery::new(JobPredicate::ByStatus(status)).oldest_first())
    }

    pub fn jobs_by_tool(&self, tool_name: &str) -> Result<Vec<JobRecord>, JobError> {
        self.list(&JobQuery::new(JobPredicate::ByTool(tool_name.to_string())).oldest_first())
    }

    pub fn jobs_by_status_and_tool(
        &self,
        status: JobStatus,
        tool_name: &str,
    ) -> Result<Vec<JobRecord>, JobError> {
        self.list(
            &JobQuery::new(JobPredicate::ByStatusAndTool(status, tool_name.to_string()))
                .oldest_first(),
        )
    }

    /// Jobs with `from <= created_at <= to`.
    pub fn jobs_created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, JobError> {
        if from > to {
            return Err(JobError::InvalidRequest(format!(
                "empty time range: {} is after {}",
                from, to
            )));
        }
        self.list(&JobQuery::new(JobPredicate::CreatedBetween(from, to)).oldest_first())
    }

    /// Jobs created in the last `days` days, newest first.
    pub fn recent_jobs(&self, days: u32) -> Result<Vec<JobRecord>, JobError> {
        let since = chrono::Duration::try_days(i64::from(days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| {
                JobError::InvalidRequest(format!("window of {} days is out of range", days))
            })?;
        self.list(&JobQuery::new(JobPredicate::CreatedSince(since)).newest_first())
    }

    pub fn failed_jobs_since(&self, since: DateTime<Utc>) -> Result<Vec<JobRecord>, JobError> {
        self.list(&JobQuery::new(JobPredicate::FailedSince(since)).newest_first())
    }

    pub fn active_jobs(&self) -> Result<Vec<JobRecord>, JobError> {
        self.list(&JobQuery::new(JobPredicate::Active).oldest_first())
    }

    pub fn active_job_count(&self) -> Result<u64, JobError> {
        let counts = self.store.status_counts()?;
        Ok(JobStatus::ALL
            .iter()
            .filter(|s| s.is_active())
            .map(|s| counts.get(s).copied().unwrap_or(0))
            .sum())
    }

    pub fn statistics(&self) -> Result<JobStatistics, JobError> {
        let counts = self.store.status_counts()?;
        let total = counts.values().sum();
        let average_processing_ms_by_tool = self.store.average_processing_time_by_tool()?;
        Ok(JobStatistics {
            counts,
            total,
            average_processing_ms_by_tool,
        })
    }

    /// Polls until the job is terminal or `timeout` passes.
    /// Returns the final record, or `None` on timeout.
    pub fn wait_for_completion(
        &self,
        job_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<JobRecord>, JobError> {
        let job = self.get_status(job_id)?;
        if job.is_finished() {
            return Ok(Some(job));
        }

        // No representable deadline means wait without one.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            thread::sleep(pause);

            let job = self.get_status(job_id)?;
            if job.is_finished() {
                return Ok(Some(job));
            }
        }
    }
}
