//! Result-hash deduplication index.
//!
//! Maps a `result_hash` to the first job that produced it. The index is
//! advisory: a lookup miss only disables result reuse.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::db::{dedup_repo, format_timestamp, Database};
use crate::error::JobError;

pub trait DedupIndex: Send + Sync {
    fn lookup(&self, result_hash: &str) -> Result<Option<String>, JobError>;

    /// Maps `result_hash` to `job_id` unless a mapping already exists.
    /// Returns `true` if this call created the mapping.
    fn record(&self, result_hash: &str, job_id: &str) -> Result<bool, JobError>;

    /// Removes the mapping if it still names `job_id`. Returns `true` if a
    /// mapping was removed.
    fn forget(&self, result_hash: &str, job_id: &str) -> Result<bool, JobError>;
}

#[derive(Default)]
pub struct MemoryDedupIndex {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryDedupIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupIndex for MemoryDedupIndex {
    fn lookup(&self, result_hash: &str) -> Result<Option<String>, JobError> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Dedup index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        Ok(entries.get(result_hash).cloned())
    }

    fn record(&self, result_hash: &str, job_id: &str) -> Result<bool, JobError> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Dedup index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        match entries.entry(result_hash.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(job_id.to_string());
                Ok(true)
            }
        }
    }

    fn forget(&self, result_hash: &str, job_id: &str) -> Result<bool, JobError> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Dedup index lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        match entries.entry(result_hash.to_string()) {
            Entry::Occupied(slot) if slot.get() == job_id => {
                slot.remove();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Dedup index persisted in the `dedup_index` table.
#[derive(Clone)]
pub struct SqliteDedupIndex {
    db: Database,
}

impl SqliteDedupIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl DedupIndex for SqliteDedupIndex {
    fn lookup(&self, result_hash: &str) -> Result<Option<String>, JobError> {
        Ok(dedup_repo::lookup(&self.db, result_hash)?)
    }

    fn record(&self, result_hash: &str, job_id: &str) -> Result<bool, JobError> {
        let recorded_at = format_timestamp(Utc::now());
        Ok(dedup_repo::record(&self.db, result_hash, job_id, &recorded_at)?)
    }

    fn forget(&self, result_hash: &str, job_id: &str) -> Result<bool, JobError> {
        Ok(dedup_repo::forget(&self.db, result_hash, job_id)?)
    }
}
