//! Job state machine.
//!
//! Every transition validates first and mutates second, so a rejected
//! transition leaves the record untouched. Callers run these inside the
//! store's atomic update.
//!
//! ```text
//! PENDING ──► PROCESSING ──► COMPLETED
//!    │            │ ▲ │
//!    │            └─┘ └────► FAILED
//!    └──────────────┴──────► CANCELLED
//! ```
//!
//! The maintenance sweep may also fail a PENDING job that outlived the
//! stale timeout; see [`JobRecord::time_out`].

use chrono::{DateTime, Utc};

use crate::error::JobError;
use crate::model::{JobRecord, JobStatus};

impl JobStatus {
    /// Whether the state graph has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

/// Result fields written on the transition into COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub result_url: String,
    pub result_hash: String,
    pub linked_job_id: Option<String>,
}

impl Completion {
    pub fn new(result_url: &str, result_hash: &str) -> Self {
        Self {
            result_url: result_url.to_string(),
            result_hash: result_hash.to_string(),
            linked_job_id: None,
        }
    }

    /// Completion that reuses the artifact of an earlier job.
    pub fn linked_to(existing: &JobRecord, result_hash: &str) -> Option<Self> {
        existing.result_url.as_ref().map(|url| Self {
            result_url: url.clone(),
            result_hash: result_hash.to_string(),
            linked_job_id: Some(existing.id.clone()),
        })
    }
}

impl JobRecord {
    fn ensure_transition(&self, to: JobStatus) -> Result<(), JobError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(JobError::IllegalTransition {
                job_id: self.id.clone(),
                from: self.status,
                to,
            })
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.created_at);
    }

    fn stamp_finished(&mut self, now: DateTime<Utc>) {
        let finished = now.max(self.created_at);
        self.completed_at = Some(finished);
        self.processing_time_ms = Some((finished - self.created_at).num_milliseconds().max(0));
    }

    /// PENDING → PROCESSING, performed by the worker that claims the job.
    pub fn claim(&mut self, operation: Option<&str>, now: DateTime<Utc>) -> Result<(), JobError> {
        if self.status != JobStatus::Pending {
            return Err(JobError::IllegalTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: JobStatus::Processing,
            });
        }

        self.status = JobStatus::Processing;
        if let Some(op) = operation {
            self.current_operation = Some(op.to_string());
        }
        self.touch(now);
        Ok(())
    }

    /// PROCESSING → PROCESSING progress report.
    ///
    /// Progress must stay within `0..=100` and never decrease. An equal value
    /// is accepted so the operation label can change on its own.
    pub fn apply_progress(
        &mut self,
        progress: u8,
        operation: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(JobError::IllegalTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        if progress > 100 || progress < self.progress {
            return Err(JobError::InvalidProgress {
                job_id: self.id.clone(),
                current: self.progress,
                requested: progress,
            });
        }

        self.progress = progress;
        if let Some(op) = operation {
            self.current_operation = Some(op.to_string());
        }
        self.touch(now);
        Ok(())
    }

    /// PROCESSING → COMPLETED.
    pub fn complete(&mut self, completion: Completion, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_transition(JobStatus::Completed)?;

        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result_url = Some(completion.result_url);
        self.result_hash = Some(completion.result_hash);
        self.linked_job_id = completion.linked_job_id;
        self.error_message = None;
        self.stamp_finished(now);
        self.touch(now);
        Ok(())
    }

    /// PROCESSING → FAILED. Progress keeps its last value.
    pub fn fail(&mut self, message: &str, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_transition(JobStatus::Failed)?;

        self.status = JobStatus::Failed;
        self.error_message = Some(message.to_string());
        self.result_url = None;
        self.result_hash = None;
        self.stamp_finished(now);
        self.touch(now);
        Ok(())
    }

    /// PENDING or PROCESSING → FAILED, reserved for the maintenance sweep
    /// when a job outlives the stale timeout. Workers use [`fail`](Self::fail).
    pub fn time_out(&mut self, message: &str, now: DateTime<Utc>) -> Result<(), JobError> {
        if !self.status.is_active() {
            return Err(JobError::IllegalTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: JobStatus::Failed,
            });
        }

        self.status = JobStatus::Failed;
        self.error_message = Some(message.to_string());
        self.result_url = None;
        self.result_hash = None;
        self.stamp_finished(now);
        self.touch(now);
        Ok(())
    }

    /// PENDING or PROCESSING → CANCELLED. Progress keeps its last value.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.ensure_transition(JobStatus::Cancelled)?;

        self.status = JobStatus::Cancelled;
        self.stamp_finished(now);
        self.touch(now);
        Ok(())
    }
}
