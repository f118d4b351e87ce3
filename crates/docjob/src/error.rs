use std::path::PathBuf;
use thiserror::Error;

use crate::model::JobStatus;

#[derive(Error, Debug)]
pub enum DocjobError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Errors raised by job lifecycle operations.
///
/// `NoWorkAvailable` is not a failure: it is the empty-queue signal that
/// `claim_next` hands back to workers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job not found: {job_id}")]
    NotFound { job_id: String },

    #[error("Job already exists: {job_id}")]
    AlreadyExists { job_id: String },

    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Invalid progress for job {job_id}: {requested} (current {current})")]
    InvalidProgress {
        job_id: String,
        current: u8,
        requested: u8,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("No work available")]
    NoWorkAvailable,
}

impl JobError {
    /// Returns true for errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, JobError::StoreUnavailable(_))
    }

    pub fn not_found(job_id: &str) -> Self {
        JobError::NotFound {
            job_id: job_id.to_string(),
        }
    }
}

impl From<crate::db::DatabaseError> for JobError {
    fn from(err: crate::db::DatabaseError) -> Self {
        JobError::StoreUnavailable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failure reported by a document processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("Processing failed: {0}")]
    Failed(String),

    #[error("Processing cancelled")]
    Cancelled,

    #[error("No processor registered for tool '{0}'")]
    UnsupportedTool(String),
}

impl ProcessorError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessorError::Failed(_))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to remove artifact '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact path escapes the storage root: {0}")]
    OutsideRoot(PathBuf),
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("{0} worker thread(s) panicked")]
    Panicked(usize),
}

pub type Result<T> = std::result::Result<T, DocjobError>;
