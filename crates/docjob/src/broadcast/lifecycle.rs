//! Lifecycle event broadcaster.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{JobRecord, JobStatus};

/// One observable change of a job record.
///
/// `old_status` is `None` for a submission, `new_status` is `None` for a
/// deletion by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub job_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<JobStatus>,
    pub progress: u8,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn submitted(job: &JobRecord) -> Self {
        Self {
            job_id: job.id.clone(),
            tool_name: job.tool_name.clone(),
            old_status: None,
            new_status: Some(job.status),
            progress: job.progress,
            timestamp: job.created_at,
        }
    }

    pub fn transition(old_status: JobStatus, job: &JobRecord) -> Self {
        Self {
            job_id: job.id.clone(),
            tool_name: job.tool_name.clone(),
            old_status: Some(old_status),
            new_status: Some(job.status),
            progress: job.progress,
            timestamp: job.updated_at,
        }
    }

    pub fn deleted(job: &JobRecord, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.id.clone(),
            tool_name: job.tool_name.clone(),
            old_status: Some(job.status),
            new_status: None,
            progress: job.progress,
            timestamp: at,
        }
    }

    /// True when the event moved the job into a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.new_status.map_or(false, |s| s.is_terminal())
            && self.old_status.map_or(true, |s| !s.is_terminal())
    }
}

/// Broadcasts lifecycle events to all subscribers.
#[derive(Clone)]
pub struct LifecycleBroadcaster {
    sender: Arc<broadcast::Sender<LifecycleEvent>>,
}

impl LifecycleBroadcaster {
    /// Creates a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: LifecycleEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewJob;

    fn job() -> JobRecord {
        JobRecord::new_pending("job-1", &NewJob::new("compare", "a.pdf", 1), Utc::now())
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = LifecycleBroadcaster::default();
        broadcaster.send(LifecycleEvent::submitted(&job()));
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_events_in_order() {
        let broadcaster = LifecycleBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        let mut record = job();
        broadcaster.send(LifecycleEvent::submitted(&record));
        record.claim(None, Utc::now()).unwrap();
        broadcaster.send(LifecycleEvent::transition(JobStatus::Pending, &record));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.old_status, None);
        assert_eq!(first.new_status, Some(JobStatus::Pending));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.old_status, Some(JobStatus::Pending));
        assert_eq!(second.new_status, Some(JobStatus::Processing));
        assert!(!second.is_terminal());
    }

    #[test]
    fn test_deleted_event_serialization() {
        let event = LifecycleEvent::deleted(&job(), Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["oldStatus"], "PENDING");
        assert!(json.get("newStatus").is_none());
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_clone_shares_channel() {
        let broadcaster = LifecycleBroadcaster::new(4);
        let clone = broadcaster.clone();
        let mut rx = broadcaster.subscribe();

        clone.send(LifecycleEvent::submitted(&job()));
        assert_eq!(rx.try_recv().unwrap().job_id, "job-1");
    }
}
