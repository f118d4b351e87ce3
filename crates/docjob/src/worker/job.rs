use std::time::Duration;

use crate::config::Config;
use crate::model::{JobRecord, JobStatus};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_count: usize,
    /// Idle wait before polling the store again when no wake-up arrives.
    pub poll_interval: Duration,
    /// Processor attempts per job, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_count: 2,
            poll_interval: Duration::from_millis(200),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            poll_interval: config.poll_interval(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }
}

/// What a worker did with one claimed job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    pub tool_name: String,
    /// Status the job was left in; `Processing` if it could not be recorded.
    pub status: JobStatus,
    /// Processor invocations; 0 when an earlier result was reused.
    pub attempts: u32,
    pub error: Option<String>,
    /// Structured data returned by the processor, if it succeeded.
    pub data: Option<serde_json::Value>,
}

impl JobOutcome {
    pub(crate) fn new(job: &JobRecord, attempts: u32) -> Self {
        Self {
            job_id: job.id.clone(),
            tool_name: job.tool_name.clone(),
            status: job.status,
            attempts,
            error: job.error_message.clone(),
            data: None,
        }
    }

    pub(crate) fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub(crate) fn with_data(mut self, data: serde_json::Value) -> Self {
        if !data.is_null() {
            self.data = Some(data);
        }
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
