//! Job repository: CRUD operations for the `jobs` table.

use rusqlite::types::ToSql;
use rusqlite::{params, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{JobRecord, JobStatus};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub tool_name: String,
    pub file_name: String,
    pub file_size: i64,
    pub input_fingerprint: Option<String>,
    pub result_url: Option<String>,
    pub result_hash: Option<String>,
    pub linked_job_id: Option<String>,
    pub error_message: Option<String>,
    pub progress: i64,
    pub current_operation: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub version: i64,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            tool_name: row.get("tool_name")?,
            file_name: row.get("file_name")?,
            file_size: row.get("file_size")?,
            input_fingerprint: row.get("input_fingerprint")?,
            result_url: row.get("result_url")?,
            result_hash: row.get("result_hash")?,
            linked_job_id: row.get("linked_job_id")?,
            error_message: row.get("error_message")?,
            progress: row.get("progress")?,
            current_operation: row.get("current_operation")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
            processing_time_ms: row.get("processing_time_ms")?,
            version: row.get("version")?,
        })
    }

    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status.as_str().to_string(),
            tool_name: record.tool_name.clone(),
            file_name: record.file_name.clone(),
            file_size: i64::try_from(record.file_size).unwrap_or(i64::MAX),
            input_fingerprint: record.input_fingerprint.clone(),
            result_url: record.result_url.clone(),
            result_hash: record.result_hash.clone(),
            linked_job_id: record.linked_job_id.clone(),
            error_message: record.error_message.clone(),
            progress: i64::from(record.progress),
            current_operation: record.current_operation.clone(),
            created_at: format_timestamp(record.created_at),
            updated_at: format_timestamp(record.updated_at),
            completed_at: record.completed_at.map(format_timestamp),
            processing_time_ms: record.processing_time_ms,
            version: i64::try_from(record.version).unwrap_or(i64::MAX),
        }
    }

    pub fn into_record(self) -> Result<JobRecord, DatabaseError> {
        let corrupt = |reason: String| DatabaseError::CorruptRow {
            id: self.id.clone(),
            reason,
        };

        let status: JobStatus = self.status.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let progress = u8::try_from(self.progress)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| corrupt(format!("progress {} out of range", self.progress)))?;
        let created_at = parse_timestamp(&self.created_at)
            .map_err(|e| corrupt(format!("created_at '{}': {}", self.created_at, e)))?;
        let updated_at = parse_timestamp(&self.updated_at)
            .map_err(|e| corrupt(format!("updated_at '{}': {}", self.updated_at, e)))?;
        let completed_at = match self.completed_at.as_deref() {
            Some(s) => Some(
                parse_timestamp(s).map_err(|e| corrupt(format!("completed_at '{}': {}", s, e)))?,
            ),
            None => None,
        };

        Ok(JobRecord {
            status,
            progress,
            created_at,
            updated_at,
            completed_at,
            file_size: u64::try_from(self.file_size).unwrap_or(0),
            version: u64::try_from(self.version).unwrap_or(0),
            id: self.id,
            tool_name: self.tool_name,
            file_name: self.file_name,
            input_fingerprint: self.input_fingerprint,
            result_url: self.result_url,
            result_hash: self.result_hash,
            linked_job_id: self.linked_job_id,
            error_message: self.error_message,
            current_operation: self.current_operation,
            processing_time_ms: self.processing_time_ms,
        })
    }
}

/// Ordering applied to query results.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Unordered,
    /// `created_at` ascending, ties broken by `id`.
    OldestFirst,
    /// `created_at` descending, ties broken by `id`.
    NewestFirst,
}

/// SQL-level filter. All set conditions are combined with AND.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    /// Status must be one of these (empty = any).
    pub statuses: Vec<String>,
    pub tool_name: Option<String>,
    /// `created_at >= from`.
    pub created_from: Option<String>,
    /// `created_at <= to`.
    pub created_to: Option<String>,
    /// `created_at < before`.
    pub created_before: Option<String>,
    /// `completed_at < before`.
    pub completed_before: Option<String>,
    pub result_hash: Option<String>,
    pub input_fingerprint: Option<String>,
    pub order: SortOrder,
    pub limit: Option<u64>,
}

/// Inserts a new job row. Returns `false` if the id is already taken.
pub fn insert(db: &Database, job: &JobRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO jobs (id, status, tool_name, file_name, file_size,
             input_fingerprint, result_url, result_hash, linked_job_id, error_message,
             progress, current_operation, created_at, updated_at, completed_at,
             processing_time_ms, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                job.id,
                job.status,
                job.tool_name,
                job.file_name,
                job.file_size,
                job.input_fingerprint,
                job.result_url,
                job.result_hash,
                job.linked_job_id,
                job.error_message,
                job.progress,
                job.current_operation,
                job.created_at,
                job.updated_at,
                job.completed_at,
                job.processing_time_ms,
                job.version,
            ],
        )?;
        Ok(inserted == 1)
    })
}

/// Writes the mutable columns of `job` if the stored version still equals
/// `expected_version`. `job.version` must already hold the next version.
///
/// Returns `false` when another writer got there first (or the row is gone).
/// `id`, `tool_name`, `file_name`, `file_size`, `input_fingerprint` and
/// `created_at` are never rewritten.
pub fn update_if_version(
    db: &Database,
    job: &JobRow,
    expected_version: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let updated = conn.execute(
            "UPDATE jobs SET status=?2, result_url=?3, result_hash=?4, linked_job_id=?5,
             error_message=?6, progress=?7, current_operation=?8, updated_at=?9,
             completed_at=?10, processing_time_ms=?11, version=?12
             WHERE id=?1 AND version=?13",
            params![
                job.id,
                job.status,
                job.result_url,
                job.result_hash,
                job.linked_job_id,
                job.error_message,
                job.progress,
                job.current_operation,
                job.updated_at,
                job.completed_at,
                job.processing_time_ms,
                job.version,
                expected_version,
            ],
        )?;
        Ok(updated == 1)
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes a job row. Returns `false` if it did not exist.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    })
}

/// Queries jobs matching `filter`.
pub fn query(db: &Database, filter: &JobFilter) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        if !filter.statuses.is_empty() {
            let mut placeholders = Vec::with_capacity(filter.statuses.len());
            for status in &filter.statuses {
                param_values.push(Box::new(status.clone()));
                placeholders.push(format!("?{}", param_values.len()));
            }
            conditions.push(format!("status IN ({})", placeholders.join(", ")));
        }
        if let Some(ref tool_name) = filter.tool_name {
            conditions.push(format!("tool_name = ?{}", param_values.len() + 1));
            param_values.push(Box::new(tool_name.clone()));
        }
        if let Some(ref from) = filter.created_from {
            conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.clone()));
        }
        if let Some(ref to) = filter.created_to {
            conditions.push(format!("created_at <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.clone()));
        }
        if let Some(ref before) = filter.created_before {
            conditions.push(format!("created_at < ?{}", param_values.len() + 1));
            param_values.push(Box::new(before.clone()));
        }
        if let Some(ref before) = filter.completed_before {
            conditions.push(format!(
                "completed_at IS NOT NULL AND completed_at < ?{}",
                param_values.len() + 1
            ));
            param_values.push(Box::new(before.clone()));
        }
        if let Some(ref hash) = filter.result_hash {
            conditions.push(format!("result_hash = ?{}", param_values.len() + 1));
            param_values.push(Box::new(hash.clone()));
        }
        if let Some(ref fingerprint) = filter.input_fingerprint {
            conditions.push(format!("input_fingerprint = ?{}", param_values.len() + 1));
            param_values.push(Box::new(fingerprint.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let order_clause = match filter.order {
            SortOrder::Unordered => "",
            SortOrder::OldestFirst => "ORDER BY created_at ASC, id ASC",
            SortOrder::NewestFirst => "ORDER BY created_at DESC, id ASC",
        };
        let limit_clause = match filter.limit {
            Some(limit) => {
                param_values.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
                format!("LIMIT ?{}", param_values.len())
            }
            None => String::new(),
        };

        let sql = format!(
            "SELECT * FROM jobs {} {} {}",
            where_clause, order_clause, limit_clause
        );
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}

/// Counts jobs grouped by status.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(status, count)| (status, u64::try_from(count).unwrap_or(0)))
            .collect())
    })
}

/// Average processing time of COMPLETED jobs, per tool.
pub fn average_processing_time_by_tool(
    db: &Database,
) -> Result<Vec<(String, f64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tool_name, AVG(processing_time_ms) FROM jobs
             WHERE status = 'COMPLETED' AND processing_time_ms IS NOT NULL
             GROUP BY tool_name ORDER BY tool_name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
