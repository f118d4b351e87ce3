use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use tracing::info_span;

use crate::config::Config;
use crate::coordinator::JobCoordinator;
use crate::error::JobError;
use crate::model::JobRecord;
use crate::sanitize::redact_url;
use crate::store::{JobPredicate, JobQuery};

pub const STALE_JOB_MESSAGE: &str = "timeout: exceeded maximum processing duration";

/// Outcome of one maintenance run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Stale jobs moved to FAILED.
    pub timed_out: usize,
    /// Expired COMPLETED jobs deleted.
    pub purged: usize,
    /// Artifacts handed back to the artifact store.
    pub reclaimed: usize,
    /// Candidates that finished or vanished before the sweep reached them.
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn changed(&self) -> usize {
        self.timed_out + self.purged
    }
}

/// One sweep over the job store.
///
/// The stale sweep and the retention sweep run independently: a store
/// failure in one is recorded in the report and the other still runs.
/// Both go through the coordinator, so a job that finishes while the sweep
/// is running keeps its terminal state.
pub struct MaintenanceScanner {
    coordinator: Arc<JobCoordinator>,
    stale_timeout: Duration,
    retention: Duration,
}

impl MaintenanceScanner {
    pub fn new(coordinator: Arc<JobCoordinator>, stale_timeout: Duration, retention: Duration) -> Self {
        Self {
            coordinator,
            stale_timeout,
            retention,
        }
    }

    pub fn from_config(coordinator: Arc<JobCoordinator>, config: &Config) -> Self {
        Self::new(coordinator, config.stale_timeout(), config.retention())
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn run(&self) -> ScanReport {
        self.run_at(Utc::now())
    }

    /// Runs both sweeps with `now` as the reference time.
    pub fn run_at(&self, now: DateTime<Utc>) -> ScanReport {
        let _span = info_span!(
            "maintenance",
            stale_timeout_secs = self.stale_timeout.num_seconds(),
            retention_days = self.retention.num_days()
        )
        .entered();

        let mut report = ScanReport::default();
        self.sweep_stale(now - self.stale_timeout, &mut report);
        self.sweep_expired(now - self.retention, &mut report);

        if report.changed() > 0 || !report.is_clean() {
            info!(
                "Maintenance: {} timed out, {} purged, {} artifacts reclaimed, {} skipped, {} errors",
                report.timed_out,
                report.purged,
                report.reclaimed,
                report.skipped,
                report.errors.len()
            );
        } else {
            debug!("Maintenance: nothing to do");
        }
        report
    }

    fn sweep_stale(&self, cutoff: DateTime<Utc>, report: &mut ScanReport) {
        let stale = match self
            .coordinator
            .list(&JobQuery::new(JobPredicate::StaleBefore(cutoff)).oldest_first())
        {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Stale sweep aborted: {}", e);
                report.errors.push(format!("stale sweep: {}", e));
                return;
            }
        };

        for job in stale {
            match self.coordinator.time_out(&job.id, STALE_JOB_MESSAGE) {
                Ok(_) => report.timed_out += 1,
                // Finished or deleted concurrently; the other writer won.
                Err(JobError::IllegalTransition { .. }) | Err(JobError::NotFound { .. }) => {
                    debug!("Job {} left the stale set before it was timed out", job.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Failed to time out job {}: {}", job.id, e);
                    report.errors.push(format!("time out {}: {}", job.id, e));
                }
            }
        }
    }

    fn sweep_expired(&self, cutoff: DateTime<Utc>, report: &mut ScanReport) {
        let expired = match self
            .coordinator
            .list(&JobQuery::new(JobPredicate::CompletedBefore(cutoff)).oldest_first())
        {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Retention sweep aborted: {}", e);
                report.errors.push(format!("retention sweep: {}", e));
                return;
            }
        };

        for job in expired {
            match self.coordinator.purge(&job.id) {
                Ok(deleted) => {
                    report.purged += 1;
                    self.reclaim_artifact(&deleted, report);
                }
                Err(JobError::NotFound { .. }) => report.skipped += 1,
                Err(e) => {
                    warn!("Failed to purge job {}: {}", job.id, e);
                    report.errors.push(format!("purge {}: {}", job.id, e));
                }
            }
        }
    }

    /// Reclaims the artifact of a purged job unless a linked job still uses it.
    fn reclaim_artifact(&self, deleted: &JobRecord, report: &mut ScanReport) {
        let (url, hash) = match (&deleted.result_url, &deleted.result_hash) {
            (Some(url), Some(hash)) => (url, hash),
            _ => return,
        };

        match self.coordinator.artifact_in_use(url, hash) {
            Ok(true) => debug!("Artifact {} still referenced, keeping it", redact_url(url)),
            Ok(false) => match self.coordinator.artifacts().reclaim(url) {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to reclaim {}: {}", redact_url(url), e);
                    report.errors.push(format!("reclaim {}: {}", deleted.id, e));
                }
            },
            Err(e) => {
                warn!("Could not check references to {}: {}", redact_url(url), e);
                report.errors.push(format!("reference check {}: {}", deleted.id, e));
            }
        }
    }
}
