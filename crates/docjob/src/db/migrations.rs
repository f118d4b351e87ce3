//! Schema migrations for the job database.
//!
//! Applied versions are listed in `_migrations`. Each pending step runs in
//! its own transaction together with its bookkeeping row, so a step that
//! fails halfway stays unrecorded and is attempted again on the next open.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::error::DatabaseError;
use super::format_timestamp;

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// Column of `jobs` the step adds. A database that already has it only
    /// records the version.
    adds_jobs_column: Option<&'static str>,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "create_jobs_table",
        sql: include_str!("sql/001_create_jobs.sql"),
        adds_jobs_column: None,
    },
    Step {
        version: 2,
        name: "create_dedup_index_table",
        sql: include_str!("sql/002_create_dedup_index.sql"),
        adds_jobs_column: None,
    },
    Step {
        version: 3,
        name: "add_input_fingerprint_to_jobs",
        sql: include_str!("sql/003_add_input_fingerprint.sql"),
        adds_jobs_column: Some("input_fingerprint"),
    },
    Step {
        version: 4,
        name: "add_linked_job_id_to_jobs",
        sql: include_str!("sql/004_add_linked_job_id.sql"),
        adds_jobs_column: Some("linked_job_id"),
    },
];

/// Brings the schema up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for step in STEPS.iter().filter(|step| step.version > current) {
        apply(conn, step)?;
    }
    Ok(())
}

fn apply(conn: &Connection, step: &Step) -> Result<(), DatabaseError> {
    let present = match step.adds_jobs_column {
        Some(column) => jobs_has_column(conn, column)?,
        None => false,
    };

    let tx = conn.unchecked_transaction()?;
    if present {
        log::info!("Schema v{} ({}): column already present", step.version, step.name);
    } else {
        log::info!("Migrating schema to v{}: {}", step.version, step.name);
        tx.execute_batch(step.sql)
            .map_err(|e| DatabaseError::Migration {
                version: step.version,
                reason: e.to_string(),
            })?;
    }
    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![step.version, step.name, format_timestamp(Utc::now())],
    )?;
    tx.commit()?;
    Ok(())
}

fn jobs_has_column(conn: &Connection, column: &str) -> Result<bool, DatabaseError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('jobs')")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
