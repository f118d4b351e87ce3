//! Job record storage.
//!
//! [`JobStore`] is the only way records are read or written. Every write
//! is a single atomic read-modify-write on one record; the store keeps
//! the immutable fields, stamps `updated_at` and bumps `version`.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::error::JobError;
use crate::model::{JobRecord, JobStatus};

pub mod memory;
pub mod query;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use query::{JobPredicate, JobQuery, QueryOrder};
pub use sqlite::SqliteJobStore;

/// Read-modify-write callback passed to [`JobStore::update`].
///
/// Receives the current record and returns the record to store, or an
/// error that aborts the update without writing anything. It may be
/// invoked more than once when the store retries after a conflict, so
/// it must not have side effects beyond its return value.
pub type Mutator<'a> = dyn FnMut(&JobRecord) -> Result<JobRecord, JobError> + 'a;

pub trait JobStore: Send + Sync {
    /// Inserts a new record. Fails with `AlreadyExists` on an id collision.
    fn create(&self, record: JobRecord) -> Result<JobRecord, JobError>;

    fn get(&self, id: &str) -> Result<JobRecord, JobError>;

    /// Atomically replaces the record with the mutator's output and
    /// returns the stored result.
    fn update(&self, id: &str, mutator: &mut Mutator<'_>) -> Result<JobRecord, JobError>;

    /// Removes the record and returns what was stored.
    fn delete(&self, id: &str) -> Result<JobRecord, JobError>;

    fn query(&self, query: &JobQuery) -> Result<Vec<JobRecord>, JobError>;

    /// Number of records per status. Statuses without records are absent.
    fn status_counts(&self) -> Result<BTreeMap<JobStatus, u64>, JobError>;

    /// Mean `processing_time_ms` of COMPLETED records, per tool.
    fn average_processing_time_by_tool(&self) -> Result<BTreeMap<String, f64>, JobError>;
}

/// Finishes a mutator's output before it is written.
fn seal_update(current: &JobRecord, mut next: JobRecord) -> JobRecord {
    next.id = current.id.clone();
    next.tool_name = current.tool_name.clone();
    next.created_at = current.created_at;
    next.version = current.version + 1;

    if next.updated_at <= current.updated_at {
        next.updated_at = Utc::now().max(current.updated_at);
    }
    next.updated_at = next.updated_at.max(next.created_at);
    next
}
