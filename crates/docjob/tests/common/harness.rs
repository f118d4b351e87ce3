//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct provides:
//! - A SQLite database and an artifact directory inside a temp directory
//! - A `JobCoordinator` wired to SQLite store, dedup index and filesystem artifacts
//! - Helpers for scanners, worker pools and waiting on jobs

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use docjob::config::DedupPolicy;
use docjob::coordinator::{CoordinatorSettings, JobCoordinator};
use docjob::db::Database;
use docjob::dedup::SqliteDedupIndex;
use docjob::maintenance::MaintenanceScanner;
use docjob::model::JobRecord;
use docjob::processor::ProcessorRegistry;
use docjob::storage::FilesystemArtifactStore;
use docjob::store::SqliteJobStore;
use docjob::worker::{WorkerPool, WorkerSettings};

pub struct TestHarness {
    temp_dir: TempDir,
    /// Root of the filesystem artifact store.
    pub artifact_dir: PathBuf,
    pub db: Database,
    pub coordinator: Arc<JobCoordinator>,
}

impl TestHarness {
    /// Create a harness with the default (`link`) dedup policy.
    pub fn new() -> Self {
        Self::with_policy(DedupPolicy::Link)
    }

    pub fn with_policy(policy: DedupPolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let artifact_dir = temp_dir.path().join("results");
        std::fs::create_dir_all(&artifact_dir).expect("Failed to create artifact dir");

        let db = Database::open(&temp_dir.path().join("data").join("docjob.db"))
            .expect("Failed to open database");

        let coordinator = JobCoordinator::new(
            Arc::new(SqliteJobStore::new(db.clone())),
            Arc::new(SqliteDedupIndex::new(db.clone())),
        )
        .with_artifacts(Arc::new(FilesystemArtifactStore::new(&artifact_dir)))
        .with_settings(CoordinatorSettings {
            store_retries: 3,
            store_backoff: Duration::from_millis(1),
            dedup_policy: policy,
            link_max_age: None,
        });

        Self {
            temp_dir,
            artifact_dir,
            db,
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write an artifact and return its URL relative to the artifact root.
    pub fn write_artifact(&self, name: &str, content: &[u8]) -> String {
        std::fs::write(self.artifact_dir.join(name), content).expect("Failed to write artifact");
        name.to_string()
    }

    pub fn artifact_exists(&self, name: &str) -> bool {
        self.artifact_dir.join(name).exists()
    }

    /// Store a prepared record directly, bypassing submission.
    pub fn insert(&self, record: JobRecord) {
        self.coordinator
            .store()
            .create(record)
            .expect("Failed to insert record");
    }

    pub fn scanner(&self, stale_timeout: chrono::Duration, retention: chrono::Duration) -> MaintenanceScanner {
        MaintenanceScanner::new(Arc::clone(&self.coordinator), stale_timeout, retention)
    }

    pub fn start_workers(&self, registry: ProcessorRegistry, worker_count: usize) -> WorkerPool {
        WorkerPool::start(
            Arc::clone(&self.coordinator),
            Arc::new(registry),
            WorkerSettings {
                worker_count,
                poll_interval: Duration::from_millis(10),
                max_attempts: 2,
                retry_delay: Duration::from_millis(1),
            },
        )
        .expect("Failed to start workers")
    }

    /// Wait until the job is terminal; panics after five seconds.
    pub fn wait_finished(&self, job_id: &str) -> JobRecord {
        self.coordinator
            .wait_for_completion(job_id, Duration::from_secs(5), Duration::from_millis(5))
            .expect("Failed to poll job")
            .unwrap_or_else(|| panic!("Job {} did not finish in time", job_id))
    }
}
