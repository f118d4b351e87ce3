//! Dedup repository: `result_hash` to first job id.

use rusqlite::params;

use super::{Database, DatabaseError};

/// Records `hash → job_id` unless the hash is already present.
///
/// Returns `true` if this call inserted the mapping.
pub fn record(
    db: &Database,
    result_hash: &str,
    job_id: &str,
    recorded_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO dedup_index (result_hash, job_id, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![result_hash, job_id, recorded_at],
        )?;
        Ok(inserted == 1)
    })
}

pub fn lookup(db: &Database, result_hash: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT job_id FROM dedup_index WHERE result_hash = ?1")?;
        let mut rows = stmt.query_map(params![result_hash], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(job_id)) => Ok(Some(job_id)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes the mapping for `hash` if it belongs to `job_id`.
pub fn forget(db: &Database, result_hash: &str, job_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM dedup_index WHERE result_hash = ?1 AND job_id = ?2",
            params![result_hash, job_id],
        )?;
        Ok(deleted == 1)
    })
}
