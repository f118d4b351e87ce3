//! Job coordinator.
//!
//! Entry point for everything that changes a job: API handlers submit and
//! cancel, workers claim, report progress, complete and fail. Each
//! operation is one atomic store update followed by a lifecycle event.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tracing::info_span;

use crate::broadcast::{LifecycleBroadcaster, LifecycleEvent};
use crate::config::{Config, DedupPolicy};
use crate::db::Database;
use crate::dedup::{DedupIndex, MemoryDedupIndex, SqliteDedupIndex};
use crate::error::{DocjobError, JobError};
use crate::lifecycle::Completion;
use crate::model::{JobRecord, JobStatus, JobStatusView, NewJob, SubmitResponse};
use crate::sanitize::{redact_url, sanitize_file_name};
use crate::storage::{ArtifactStore, FilesystemArtifactStore, NoopArtifactStore};
use crate::store::{JobPredicate, JobQuery, JobStore, MemoryJobStore, SqliteJobStore};

pub mod admin;

pub use admin::JobStatistics;

/// How many PENDING candidates one claim round looks at.
const CLAIM_BATCH: usize = 32;

/// Pending wake-ups kept for idle workers.
const WORK_SIGNAL_CAPACITY: usize = 1024;

pub const SUBMIT_MESSAGE: &str = "Job submitted successfully";

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Extra attempts for an operation that failed with `StoreUnavailable`.
    pub store_retries: u32,
    /// Backoff unit; attempt `n` sleeps `n * store_backoff`.
    pub store_backoff: Duration,
    pub dedup_policy: DedupPolicy,
    /// Producers completed longer ago than this are never linked to, so the
    /// retention sweep cannot purge a producer while a link to it is being
    /// written. `None` links regardless of age.
    pub link_max_age: Option<chrono::Duration>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            store_retries: 3,
            store_backoff: Duration::from_millis(50),
            dedup_policy: DedupPolicy::Link,
            link_max_age: None,
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            store_retries: config.store_retries,
            dedup_policy: config.dedup,
            link_max_age: Some(config.link_max_age()),
            ..Self::default()
        }
    }
}

/// Result of a progress report.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressOutcome {
    Applied(JobRecord),
    /// The report was stale or out of range and was dropped.
    Discarded { current: u8, requested: u8 },
}

pub struct JobCoordinator {
    store: Arc<dyn JobStore>,
    dedup: Arc<dyn DedupIndex>,
    artifacts: Arc<dyn ArtifactStore>,
    events: LifecycleBroadcaster,
    settings: CoordinatorSettings,
    work_tx: Sender<()>,
    work_rx: Receiver<()>,
}

impl JobCoordinator {
    pub fn new(store: Arc<dyn JobStore>, dedup: Arc<dyn DedupIndex>) -> Self {
        let (work_tx, work_rx) = bounded(WORK_SIGNAL_CAPACITY);
        Self {
            store,
            dedup,
            artifacts: Arc::new(NoopArtifactStore),
            events: LifecycleBroadcaster::default(),
            settings: CoordinatorSettings::default(),
            work_tx,
            work_rx,
        }
    }

    /// Coordinator over in-memory store and dedup index.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryDedupIndex::new()),
        )
    }

    /// Opens the configured database and wires the persistent store,
    /// dedup index and artifact store.
    pub fn from_config(config: &Config) -> Result<Self, DocjobError> {
        let db = Database::open_configured(&config.database_path)?;
        let artifacts: Arc<dyn ArtifactStore> = match config.artifact_root {
            Some(ref root) => Arc::new(FilesystemArtifactStore::new(root)),
            None => Arc::new(NoopArtifactStore),
        };

        Ok(Self::new(
            Arc::new(SqliteJobStore::new(db.clone())),
            Arc::new(SqliteDedupIndex::new(db)),
        )
        .with_artifacts(artifacts)
        .with_events(LifecycleBroadcaster::new(config.event_capacity))
        .with_settings(CoordinatorSettings::from(config)))
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_events(mut self, events: LifecycleBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn artifacts(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.artifacts)
    }

    pub fn events(&self) -> &LifecycleBroadcaster {
        &self.events
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Receiver that gets one message per submission; idle workers wait on it.
    pub fn work_signal(&self) -> Receiver<()> {
        self.work_rx.clone()
    }

    // ============================================================================
    // Submission
    // ============================================================================

    /// Creates a PENDING job and returns its id.
    pub fn submit(&self, tool_name: &str, file_name: &str, file_size: u64) -> Result<String, JobError> {
        self.submit_job(NewJob::new(tool_name, file_name, file_size))
            .map(|response| response.job_id)
    }

    /// Creates a PENDING job. Never waits on processing.
    pub fn submit_job(&self, new_job: NewJob) -> Result<SubmitResponse, JobError> {
        if new_job.tool_name.trim().is_empty() {
            return Err(JobError::InvalidRequest(
                "tool name must not be empty".to_string(),
            ));
        }

        let new_job = NewJob {
            file_name: sanitize_file_name(&new_job.file_name),
            ..new_job
        };
        let record = JobRecord::new_pending(&uuid::Uuid::new_v4().to_string(), &new_job, Utc::now());

        let created = self.with_store_retry("submit", || self.store.create(record.clone()))?;

        info!(
            "Job {} submitted (tool={}, file={}, size={})",
            created.id, created.tool_name, created.file_name, created.file_size
        );
        self.events.send(LifecycleEvent::submitted(&created));
        // A full signal channel already guarantees a wake-up.
        let _ = self.work_tx.try_send(());

        Ok(SubmitResponse {
            job_id: created.id,
            status: created.status,
            message: SUBMIT_MESSAGE.to_string(),
        })
    }

    // ============================================================================
    // Worker side
    // ============================================================================

    /// Moves the oldest PENDING job to PROCESSING and returns it.
    ///
    /// Candidates are taken in `created_at` order with ties broken by id.
    /// A candidate lost to a concurrent claim or cancel is skipped.
    pub fn claim_next(&self) -> Result<JobRecord, JobError> {
        let query = JobQuery::new(JobPredicate::ByStatus(JobStatus::Pending))
            .oldest_first()
            .limit(CLAIM_BATCH);

        loop {
            let candidates = self.with_store_retry("claim", || self.store.query(&query))?;
            if candidates.is_empty() {
                return Err(JobError::NoWorkAvailable);
            }

            for candidate in &candidates {
                match self.transition(&candidate.id, "claim", |job| {
                    job.claim(Some("Starting processing"), Utc::now())
                }) {
                    Ok(job) => {
                        debug!("Claimed job {}", job.id);
                        return Ok(job);
                    }
                    Err(JobError::IllegalTransition { .. }) | Err(JobError::NotFound { .. }) => {
                        continue
                    }
                    Err(e) => return Err(e),
                }
            }

            if candidates.len() < CLAIM_BATCH {
                return Err(JobError::NoWorkAvailable);
            }
        }
    }

    /// Records progress of a PROCESSING job.
    ///
    /// Out-of-order or out-of-range reports are logged and discarded.
    /// Any other rejection (e.g. the job was cancelled) is returned.
    pub fn report_progress(
        &self,
        job_id: &str,
        progress: u8,
        operation: Option<&str>,
    ) -> Result<ProgressOutcome, JobError> {
        match self.transition(job_id, "progress", |job| {
            job.apply_progress(progress, operation, Utc::now())
        }) {
            Ok(job) => Ok(ProgressOutcome::Applied(job)),
            Err(JobError::InvalidProgress {
                current, requested, ..
            }) => {
                debug!(
                    "Discarding stale progress for job {}: {} (current {})",
                    job_id, requested, current
                );
                Ok(ProgressOutcome::Discarded { current, requested })
            }
            Err(e) => Err(e),
        }
    }

    /// PROCESSING → COMPLETED, applying the dedup policy.
    ///
    /// Under [`DedupPolicy::Link`], a result whose hash was already produced
    /// by a compatible COMPLETED job is linked to that job's artifact and the
    /// new artifact is reclaimed.
    pub fn complete(&self, job_id: &str, result_url: &str, result_hash: &str) -> Result<JobRecord, JobError> {
        let _span = info_span!("complete_job", job_id = %job_id).entered();

        let job = self.get_status(job_id)?;
        let completion = match self.settings.dedup_policy {
            DedupPolicy::Link => self
                .linked_completion(&job, result_hash)
                .unwrap_or_else(|| Completion::new(result_url, result_hash)),
            DedupPolicy::Record => Completion::new(result_url, result_hash),
        };

        let completed = self.transition(job_id, "complete", |job| {
            job.complete(completion.clone(), Utc::now())
        })?;

        match completed.linked_job_id {
            Some(ref linked) => {
                info!(
                    "Job {} completed by linking to job {} ({})",
                    job_id,
                    linked,
                    redact_url(completion.result_url.as_str())
                );
                if result_url != completion.result_url {
                    self.reclaim(result_url);
                }
            }
            None => {
                info!("Job {} completed ({})", job_id, redact_url(result_url));
                self.record_hash(result_hash, job_id);
            }
        }

        Ok(completed)
    }

    /// PROCESSING → FAILED.
    pub fn fail(&self, job_id: &str, error_message: &str) -> Result<JobRecord, JobError> {
        let failed = self.transition(job_id, "fail", |job| job.fail(error_message, Utc::now()))?;
        warn!("Job {} failed: {}", job_id, error_message);
        Ok(failed)
    }

    /// PENDING or PROCESSING → CANCELLED. A running worker notices on its
    /// next progress report.
    pub fn cancel(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let cancelled = self.transition(job_id, "cancel", |job| job.cancel(Utc::now()))?;
        info!("Job {} cancelled", job_id);
        Ok(cancelled)
    }

    pub fn get_status(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.with_store_retry("get", || self.store.get(job_id))
    }

    pub fn status_view(&self, job_id: &str) -> Result<JobStatusView, JobError> {
        self.get_status(job_id).map(|job| JobStatusView::from(&job))
    }

    pub fn is_cancelled(&self, job_id: &str) -> Result<bool, JobError> {
        Ok(self.get_status(job_id)?.status == JobStatus::Cancelled)
    }

    // ============================================================================
    // Maintenance
    // ============================================================================

    /// PENDING or PROCESSING → FAILED for a job that outlived the stale timeout.
    pub fn time_out(&self, job_id: &str, error_message: &str) -> Result<JobRecord, JobError> {
        let failed = self.transition(job_id, "time_out", |job| {
            job.time_out(error_message, Utc::now())
        })?;
        warn!("Job {} timed out after {} ms", job_id, failed.processing_time_ms.unwrap_or(0));
        Ok(failed)
    }

    /// Deletes a job record and emits a deletion event. Artifacts are left
    /// to the caller, who knows whether other records still share them.
    /// A dedup entry naming the job is dropped with it.
    pub fn purge(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let deleted = self.with_store_retry("purge", || self.store.delete(job_id))?;
        if let Some(ref hash) = deleted.result_hash {
            match self.dedup.forget(hash, job_id) {
                Ok(true) => debug!("Dropped dedup entry {} of job {}", hash, job_id),
                Ok(false) => {}
                Err(e) => warn!("Failed to drop dedup entry of job {}: {}", job_id, e),
            }
        }
        self.events.send(LifecycleEvent::deleted(&deleted, Utc::now()));
        debug!("Job {} purged", job_id);
        Ok(deleted)
    }

    /// Whether any stored job still points at `result_url`.
    pub fn artifact_in_use(&self, result_url: &str, result_hash: &str) -> Result<bool, JobError> {
        let query = JobQuery::new(JobPredicate::ByResultHash(result_hash.to_string()));
        Ok(self
            .with_store_retry("artifact_in_use", || self.store.query(&query))?
            .iter()
            .any(|job| job.result_url.as_deref() == Some(result_url)))
    }

    // ============================================================================
    // Result reuse
    // ============================================================================

    /// An earlier COMPLETED job of the same tool produced from the same input.
    pub fn find_reusable(&self, job: &JobRecord) -> Result<Option<JobRecord>, JobError> {
        let fingerprint = match job.input_fingerprint {
            Some(ref fp) => fp.clone(),
            None => return Ok(None),
        };
        let query = JobQuery::new(JobPredicate::ReusableResult {
            tool_name: job.tool_name.clone(),
            input_fingerprint: fingerprint,
        })
        .oldest_first();

        Ok(self
            .with_store_retry("find_reusable", || self.store.query(&query))?
            .into_iter()
            .find(|existing| existing.id != job.id && self.within_link_age(existing)))
    }

    /// Completes `job_id` with the artifact of `existing` without processing.
    pub fn reuse_result(&self, job_id: &str, existing: &JobRecord) -> Result<JobRecord, JobError> {
        let hash = existing.result_hash.clone().unwrap_or_default();
        let completion = Completion::linked_to(existing, &hash).ok_or_else(|| {
            JobError::InvalidRequest(format!("job {} has no result to reuse", existing.id))
        })?;

        let completed = self.transition(job_id, "reuse", |job| {
            job.complete(completion.clone(), Utc::now())
        })?;
        info!("Job {} reused the result of job {}", job_id, existing.id);
        Ok(completed)
    }

    fn linked_completion(&self, job: &JobRecord, result_hash: &str) -> Option<Completion> {
        let compatible = |existing: &JobRecord| {
            existing.id != job.id
                && existing.status == JobStatus::Completed
                && existing.tool_name == job.tool_name
                && existing.linked_job_id.is_none()
                && self.within_link_age(existing)
                && match (&existing.input_fingerprint, &job.input_fingerprint) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        };

        let indexed = match self.dedup.lookup(result_hash) {
            Ok(Some(first_id)) => match self.store.get(&first_id) {
                Ok(existing) => Some(existing),
                Err(JobError::NotFound { .. }) => None,
                Err(e) => {
                    warn!("Dedup lookup of job {} failed: {}", first_id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Dedup index unavailable, not linking: {}", e);
                return None;
            }
        };

        let existing = match indexed.filter(|e| compatible(e)) {
            Some(existing) => Some(existing),
            // The indexed producer may have been purged; fall back to the store.
            None => self
                .store
                .query(&JobQuery::new(JobPredicate::ByResultHash(result_hash.to_string())).oldest_first())
                .unwrap_or_default()
                .into_iter()
                .find(|e| compatible(e)),
        }?;

        Completion::linked_to(&existing, result_hash)
    }

    /// Whether `producer` completed recently enough to be linked to.
    fn within_link_age(&self, producer: &JobRecord) -> bool {
        match (self.settings.link_max_age, producer.completed_at) {
            (Some(max_age), Some(completed_at)) => Utc::now()
                .checked_sub_signed(max_age)
                .map_or(true, |cutoff| completed_at >= cutoff),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    fn record_hash(&self, result_hash: &str, job_id: &str) {
        match self.dedup.record(result_hash, job_id) {
            Ok(true) => debug!("Recorded result hash {} for job {}", result_hash, job_id),
            Ok(false) => debug!("Result hash {} already recorded", result_hash),
            Err(e) => warn!("Failed to record result hash for job {}: {}", job_id, e),
        }
    }

    /// Hands an artifact that no record references to the artifact store.
    pub fn reclaim(&self, result_url: &str) {
        if let Err(e) = self.artifacts.reclaim(result_url) {
            warn!("Failed to reclaim artifact {}: {}", redact_url(result_url), e);
        }
    }

    // ============================================================================
    // Plumbing
    // ============================================================================

    /// Applies one state-machine transition atomically and emits its event.
    fn transition<F>(&self, job_id: &str, operation: &str, mut apply: F) -> Result<JobRecord, JobError>
    where
        F: FnMut(&mut JobRecord) -> Result<(), JobError>,
    {
        let mut old_status = JobStatus::Pending;
        let updated = self.with_store_retry(operation, || {
            self.store.update(job_id, &mut |current: &JobRecord| {
                old_status = current.status;
                let mut next = current.clone();
                apply(&mut next)?;
                Ok(next)
            })
        })?;

        self.events.send(LifecycleEvent::transition(old_status, &updated));
        Ok(updated)
    }

    /// Retries `StoreUnavailable` with linear backoff.
    fn with_store_retry<T, F>(&self, operation: &str, mut f: F) -> Result<T, JobError>
    where
        F: FnMut() -> Result<T, JobError>,
    {
        let mut attempt = 0u32;
        loop {
            match f() {
                Err(e) if e.is_transient() && attempt < self.settings.store_retries => {
                    attempt += 1;
                    warn!(
                        "Store unavailable during {} ({}), retry {}/{}",
                        operation, e, attempt, self.settings.store_retries
                    );
                    thread::sleep(self.settings.store_backoff * attempt);
                }
                result => return result,
            }
        }
    }
}
