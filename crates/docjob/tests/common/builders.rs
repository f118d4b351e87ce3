//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use docjob::lifecycle::Completion;
use docjob::model::{JobRecord, NewJob};

/// Builder for job records at arbitrary points of their lifecycle.
///
/// Transitions go through the real state machine, so built records
/// satisfy the same invariants as records written by the coordinator.
pub struct JobRecordBuilder {
    id: String,
    tool_name: String,
    file_name: String,
    file_size: u64,
    fingerprint: Option<String>,
    created_at: DateTime<Utc>,
    progress: Option<u8>,
    end: End,
}

enum End {
    Pending,
    Processing,
    Completed {
        result_url: String,
        result_hash: String,
        finished_at: DateTime<Utc>,
    },
    Failed {
        message: String,
        finished_at: DateTime<Utc>,
    },
    Cancelled,
}

impl JobRecordBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tool_name: "compare".to_string(),
            file_name: "a.pdf".to_string(),
            file_size: 1024,
            fingerprint: None,
            created_at: Utc::now(),
            progress: None,
            end: End::Pending,
        }
    }

    pub fn tool(mut self, tool_name: &str) -> Self {
        self.tool_name = tool_name.to_string();
        self
    }

    pub fn file(mut self, file_name: &str, file_size: u64) -> Self {
        self.file_name = file_name.to_string();
        self.file_size = file_size;
        self
    }

    pub fn fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }

    pub fn created_ago(mut self, age: Duration) -> Self {
        self.created_at = Utc::now() - age;
        self
    }

    pub fn processing(mut self) -> Self {
        self.end = End::Processing;
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.end = End::Processing;
        self.progress = Some(progress);
        self
    }

    /// Completed `finished_ago` before now.
    pub fn completed_ago(mut self, result_url: &str, result_hash: &str, finished_ago: Duration) -> Self {
        let finished_at = Utc::now() - finished_ago;
        if self.created_at > finished_at {
            self.created_at = finished_at - Duration::minutes(1);
        }
        self.end = End::Completed {
            result_url: result_url.to_string(),
            result_hash: result_hash.to_string(),
            finished_at,
        };
        self
    }

    pub fn failed(mut self, message: &str) -> Self {
        self.end = End::Failed {
            message: message.to_string(),
            finished_at: self.created_at,
        };
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.end = End::Cancelled;
        self
    }

    pub fn build(self) -> JobRecord {
        let mut new_job = NewJob::new(&self.tool_name, &self.file_name, self.file_size);
        new_job.input_fingerprint = self.fingerprint;
        let mut record = JobRecord::new_pending(&self.id, &new_job, self.created_at);
        let at = self.created_at;

        match self.end {
            End::Pending => {}
            End::Cancelled => record.cancel(at).expect("cancel"),
            End::Processing => {
                record.claim(None, at).expect("claim");
                if let Some(progress) = self.progress {
                    record.apply_progress(progress, None, at).expect("progress");
                }
            }
            End::Completed {
                result_url,
                result_hash,
                finished_at,
            } => {
                record.claim(None, at).expect("claim");
                record
                    .complete(Completion::new(&result_url, &result_hash), finished_at)
                    .expect("complete");
            }
            End::Failed {
                message,
                finished_at,
            } => {
                record.claim(None, at).expect("claim");
                record.fail(&message, finished_at).expect("fail");
            }
        }
        record
    }
}

/// Builder for config JSON documents.
pub struct ConfigBuilder {
    value: serde_json::Value,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            value: json!({
                "version": "1.0",
                "database_path": ":memory:",
                "worker_count": 1
            }),
        }
    }

    pub fn set(mut self, key: &str, value: serde_json::Value) -> Self {
        self.value[key] = value;
        self
    }

    pub fn database_path(self, path: &str) -> Self {
        self.set("database_path", json!(path))
    }

    pub fn artifact_root(self, path: &str) -> Self {
        self.set("artifact_root", json!(path))
    }

    pub fn worker_count(self, count: usize) -> Self {
        self.set("worker_count", json!(count))
    }

    pub fn dedup(self, policy: &str) -> Self {
        self.set("dedup", json!(policy))
    }

    pub fn build(self) -> String {
        serde_json::to_string_pretty(&self.value).expect("Failed to serialize config")
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
