//! Lifecycle scenarios against the SQLite-backed coordinator.

mod common;

use common::{JobRecordBuilder, TestHarness};
use docjob::coordinator::ProgressOutcome;
use docjob::error::JobError;
use docjob::model::{JobStatus, NewJob};

#[test]
fn test_compare_job_scenario() {
    let harness = TestHarness::new();
    let coordinator = &harness.coordinator;

    let id = coordinator.submit("compare", "a.pdf", 2048).unwrap();
    let job = coordinator.get_status(&id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);

    let claimed = coordinator.claim_next().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.status, JobStatus::Processing);

    coordinator.report_progress(&id, 50, Some("Comparing pages")).unwrap();
    assert_eq!(coordinator.get_status(&id).unwrap().progress, 50);

    let late = coordinator.report_progress(&id, 30, None).unwrap();
    assert_eq!(
        late,
        ProgressOutcome::Discarded {
            current: 50,
            requested: 30
        }
    );
    assert_eq!(coordinator.get_status(&id).unwrap().progress, 50);

    let done = coordinator.complete(&id, "s3://x", "abc123").unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.result_url.as_deref(), Some("s3://x"));
    assert_eq!(done.result_hash.as_deref(), Some("abc123"));
    assert!(done.completed_at.is_some());
    assert!(done.processing_time_ms.unwrap() >= 0);

    // What the store holds matches what complete returned.
    assert_eq!(coordinator.get_status(&id).unwrap(), done);
}

#[test]
fn test_out_of_order_progress_never_decreases() {
    let harness = TestHarness::new();
    let coordinator = &harness.coordinator;
    let id = coordinator.submit("extract", "form.pdf", 1).unwrap();
    coordinator.claim_next().unwrap();

    let mut highest = 0;
    for progress in [10u8, 40, 20, 40, 35, 90, 60, 100, 99] {
        coordinator.report_progress(&id, progress, None).unwrap();
        highest = highest.max(progress);
        assert_eq!(coordinator.get_status(&id).unwrap().progress, highest);
    }
}

#[test]
fn test_failure_clears_results_and_keeps_progress() {
    let harness = TestHarness::new();
    let coordinator = &harness.coordinator;
    let id = coordinator.submit("validate", "b.pdf", 1).unwrap();
    coordinator.claim_next().unwrap();
    coordinator.report_progress(&id, 70, None).unwrap();

    let failed = coordinator.fail(&id, "invalid signature").unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress, 70);
    assert_eq!(failed.error_message.as_deref(), Some("invalid signature"));
    assert!(failed.result_url.is_none());
    assert!(failed.result_hash.is_none());
    assert!(failed.completed_at.is_some());
}

#[test]
fn test_cancel_pending_and_processing() {
    let harness = TestHarness::new();
    let coordinator = &harness.coordinator;

    let pending = coordinator.submit("compare", "a.pdf", 1).unwrap();
    let cancelled = coordinator.cancel(&pending).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());
    assert_eq!(
        coordinator.claim_next().unwrap_err(),
        JobError::NoWorkAvailable
    );

    let running = coordinator.submit("compare", "b.pdf", 1).unwrap();
    coordinator.claim_next().unwrap();
    coordinator.report_progress(&running, 20, None).unwrap();
    coordinator.cancel(&running).unwrap();

    // The worker's next report tells it to stop.
    assert!(matches!(
        coordinator.report_progress(&running, 30, None),
        Err(JobError::IllegalTransition {
            from: JobStatus::Cancelled,
            ..
        })
    ));
    let job = coordinator.get_status(&running).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 20);
}

#[test]
fn test_terminal_jobs_reject_every_operation() {
    let harness = TestHarness::new();
    harness.insert(JobRecordBuilder::new("done").completed_ago("s3://x", "h", chrono::Duration::minutes(5)).build());
    harness.insert(JobRecordBuilder::new("failed").failed("boom").build());
    harness.insert(JobRecordBuilder::new("cancelled").cancelled().build());
    let coordinator = &harness.coordinator;

    for id in ["done", "failed", "cancelled"] {
        let before = coordinator.get_status(id).unwrap();
        assert!(matches!(coordinator.cancel(id), Err(JobError::IllegalTransition { .. })));
        assert!(matches!(coordinator.fail(id, "late"), Err(JobError::IllegalTransition { .. })));
        assert!(matches!(
            coordinator.complete(id, "s3://y", "h2"),
            Err(JobError::IllegalTransition { .. })
        ));
        assert!(matches!(
            coordinator.report_progress(id, 100, None),
            Err(JobError::IllegalTransition { .. })
        ));
        assert_eq!(coordinator.get_status(id).unwrap(), before);
    }
}

#[test]
fn test_unknown_job_is_not_found() {
    let harness = TestHarness::new();
    let err = harness.coordinator.status_view("missing").unwrap_err();
    assert_eq!(err, JobError::not_found("missing"));
}

#[test]
fn test_status_view_projection() {
    let harness = TestHarness::new();
    let response = harness
        .coordinator
        .submit_job(NewJob::new("compare", "quarterly report.pdf", 4096))
        .unwrap();
    assert_eq!(response.status, JobStatus::Pending);
    assert_eq!(response.message, "Job submitted successfully");

    let view = harness.coordinator.status_view(&response.job_id).unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["jobId"], response.job_id.as_str());
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["fileName"], "quarterly_report.pdf");
    assert_eq!(json["progress"], 0);
    assert!(json.get("completedAt").is_none());
}

#[test]
fn test_lifecycle_events_reach_subscribers() {
    let harness = TestHarness::new();
    let mut events = harness.coordinator.subscribe_events();
    let coordinator = &harness.coordinator;

    let id = coordinator.submit("compare", "a.pdf", 1).unwrap();
    coordinator.claim_next().unwrap();
    coordinator.report_progress(&id, 40, None).unwrap();
    coordinator.complete(&id, "s3://x", "h").unwrap();

    let received: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(received.len(), 4);
    assert!(received.iter().all(|e| e.job_id == id));
    assert!(received.last().unwrap().is_terminal());
    assert_eq!(received[2].progress, 40);
}
