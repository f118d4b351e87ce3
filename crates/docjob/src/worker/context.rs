use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::coordinator::{JobCoordinator, ProgressOutcome};
use crate::error::{JobError, ProcessorError};
use crate::processor::ProgressSink;

/// Progress sink for one claimed job.
///
/// Each report is its own atomic store update. Once the job has left
/// PROCESSING (cancelled, or timed out by maintenance) every report
/// returns `ProcessorError::Cancelled` so the processor stops.
pub struct JobContext {
    coordinator: Arc<JobCoordinator>,
    job_id: String,
    stopped: AtomicBool,
}

impl JobContext {
    pub fn new(coordinator: Arc<JobCoordinator>, job_id: &str) -> Self {
        Self {
            coordinator,
            job_id: job_id.to_string(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn mark_stopped(&self) -> ProcessorError {
        self.stopped.store(true, Ordering::Release);
        ProcessorError::Cancelled
    }
}

impl ProgressSink for JobContext {
    fn report(&self, percent: u8, operation: &str) -> Result<(), ProcessorError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ProcessorError::Cancelled);
        }

        match self
            .coordinator
            .report_progress(&self.job_id, percent, Some(operation))
        {
            Ok(ProgressOutcome::Applied(_)) | Ok(ProgressOutcome::Discarded { .. }) => Ok(()),
            Err(JobError::IllegalTransition { from, .. }) => {
                debug!("Job {} is {}, stopping processor", self.job_id, from);
                Err(self.mark_stopped())
            }
            Err(JobError::NotFound { .. }) => Err(self.mark_stopped()),
            Err(e) => {
                // Progress is advisory; keep processing.
                warn!("Progress report for job {} lost: {}", self.job_id, e);
                Ok(())
            }
        }
    }

    /// True once the job is no longer PROCESSING.
    fn is_cancelled(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return true;
        }
        match self.coordinator.get_status(&self.job_id) {
            Ok(job) if job.is_finished() => {
                self.mark_stopped();
                true
            }
            Ok(_) => false,
            Err(JobError::NotFound { .. }) => {
                self.mark_stopped();
                true
            }
            Err(e) => {
                warn!("Cancellation check for job {} failed: {}", self.job_id, e);
                false
            }
        }
    }
}
