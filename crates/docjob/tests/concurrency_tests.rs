//! Concurrent claims and updates against the SQLite store.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use common::TestHarness;
use docjob::error::JobError;
use docjob::model::JobStatus;

#[test]
fn test_m_workers_race_n_jobs() {
    let harness = TestHarness::new();
    let jobs = 6;
    let workers = 16;
    for i in 0..jobs {
        harness
            .coordinator
            .submit("compare", &format!("doc-{}.pdf", i), 1)
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let coordinator = Arc::clone(&harness.coordinator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                coordinator.claim_next()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let claimed: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|job| job.id.clone()))
        .collect();
    let unique: HashSet<_> = claimed.iter().cloned().collect();
    assert_eq!(claimed.len(), jobs, "every job claimed");
    assert_eq!(unique.len(), jobs, "no job claimed twice");

    let empty = results
        .iter()
        .filter(|r| matches!(r, Err(JobError::NoWorkAvailable)))
        .count();
    assert_eq!(empty, workers - jobs);

    assert_eq!(
        harness
            .coordinator
            .jobs_by_status(JobStatus::Processing)
            .unwrap()
            .len(),
        jobs
    );
}

#[test]
fn test_concurrent_progress_reports_stay_monotonic() {
    let harness = TestHarness::new();
    let id = harness.coordinator.submit("compare", "a.pdf", 1).unwrap();
    harness.coordinator.claim_next().unwrap();

    let reporters = 8;
    let barrier = Arc::new(Barrier::new(reporters));
    let handles: Vec<_> = (0..reporters)
        .map(|r| {
            let coordinator = Arc::clone(&harness.coordinator);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                // Interleaved, partly descending sequences.
                for step in (0..10u8).rev() {
                    let progress = step * 10 + r as u8;
                    coordinator.report_progress(&id, progress, None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let job = harness.coordinator.get_status(&id).unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    // Each thread's first report is its maximum: 90 + r.
    assert_eq!(job.progress, 90 + (reporters as u8 - 1));
}

#[test]
fn test_cancel_races_completion_exactly_one_wins() {
    for _ in 0..10 {
        let harness = TestHarness::new();
        let id = harness.coordinator.submit("compare", "a.pdf", 1).unwrap();
        harness.coordinator.claim_next().unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let complete = {
            let coordinator = Arc::clone(&harness.coordinator);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.complete(&id, "s3://x", "h")
            })
        };
        let cancel = {
            let coordinator = Arc::clone(&harness.coordinator);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.cancel(&id)
            })
        };

        let loser = match (complete.join().unwrap(), cancel.join().unwrap()) {
            (Ok(_), Err(e)) | (Err(e), Ok(_)) => e,
            other => panic!("expected exactly one terminal transition, got {:?}", other),
        };
        assert!(matches!(loser, JobError::IllegalTransition { .. }));

        let job = harness.coordinator.get_status(&id).unwrap();
        assert!(job.status == JobStatus::Completed || job.status == JobStatus::Cancelled);
    }
}
