//! Job record and the projections handed to API callers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal states accept no further status transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending or processing.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Input of a job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub tool_name: String,
    pub file_name: String,
    pub file_size: u64,
    /// Content hash of the uploaded input, used to find reusable results.
    pub input_fingerprint: Option<String>,
}

impl NewJob {
    pub fn new(tool_name: &str, file_name: &str, file_size: u64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            file_name: file_name.to_string(),
            file_size,
            input_fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.input_fingerprint = Some(fingerprint.to_string());
        self
    }
}

/// The stored state of one job.
///
/// Fields are public for reading and for building fixtures; status-changing
/// writes go through the transition methods in [`crate::lifecycle`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub tool_name: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_hash: Option<String>,
    /// Earlier job whose artifact this job reuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    /// Compare-and-swap token, bumped by the store on every write.
    pub version: u64,
}

impl JobRecord {
    /// Creates a fresh PENDING record.
    pub fn new_pending(id: &str, job: &NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatus::Pending,
            tool_name: job.tool_name.clone(),
            file_name: job.file_name.clone(),
            file_size: job.file_size,
            input_fingerprint: job.input_fingerprint.clone(),
            result_url: None,
            result_hash: None,
            linked_job_id: None,
            error_message: None,
            progress: 0,
            current_operation: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            processing_time_ms: None,
            version: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Poll projection of a job as returned to API callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub tool_name: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_operation: Option<String>,
}

impl From<&JobRecord> for JobStatusView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.id.clone(),
            status: record.status,
            tool_name: record.tool_name.clone(),
            file_name: record.file_name.clone(),
            result_url: record.result_url.clone(),
            error_message: record.error_message.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
            processing_time_ms: record.processing_time_ms,
            progress: record.progress,
            current_operation: record.current_operation.clone(),
        }
    }
}

/// Response to a job submission.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("processing".parse::<JobStatus>().unwrap(), JobStatus::Processing);
        assert!("superseded".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_active_partition() {
        for status in JobStatus::ALL {
            assert_ne!(status.is_terminal(), status.is_active());
        }
    }

    #[test]
    fn test_new_pending_defaults() {
        let now = Utc::now();
        let job = NewJob::new("compare", "a.pdf", 1024).with_fingerprint("in-1");
        let record = JobRecord::new_pending("job-1", &job, now);

        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.progress, 0);
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.input_fingerprint.as_deref(), Some("in-1"));
        assert!(record.completed_at.is_none());
        assert!(record.processing_time_ms.is_none());
        assert!(!record.is_finished());
    }

    #[test]
    fn test_status_view_serializes_camel_case() {
        let record = JobRecord::new_pending("job-2", &NewJob::new("extract", "b.pdf", 1), Utc::now());
        let view = JobStatusView::from(&record);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["jobId"], "job-2");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["toolName"], "extract");
        assert!(json.get("resultUrl").is_none());
    }
}
