//! Applied-steps ledger.
//!
//! Lives in the same store as the data it describes so that recording a step
//! shares the step's atomic unit. Reading never writes: a store without the
//! ledger table simply has nothing applied.

use crate::error::MigrateResult;
use crate::step::Step;
use ob_store::catalog::table_exists;
use ob_store::StoreError;
use rusqlite::{params, Connection};
use serde::Serialize;

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "schema_migrations";

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    /// RFC 3339 commit time
    pub applied_at: String,
}

/// Create the ledger table if it does not exist.
pub fn ensure_table(conn: &Connection) -> MigrateResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version    INTEGER PRIMARY KEY,
             name       TEXT NOT NULL,
             checksum   TEXT NOT NULL,
             applied_at TEXT NOT NULL
         );",
    )
    .map_err(|e| StoreError::with_context(e, format!("failed to create {LEDGER_TABLE} table")))?;
    Ok(())
}

/// Every applied step, by ascending version.
pub fn load(conn: &Connection) -> MigrateResult<Vec<AppliedStep>> {
    if !table_exists(conn, LEDGER_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT version, name, checksum, applied_at FROM schema_migrations ORDER BY version",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedStep {
                version: row.get(0)?,
                name: row.get(1)?,
                checksum: row.get(2)?,
                applied_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Mark `step` applied. Must be the last write of the step's unit.
///
/// A plain insert: recording the same version twice is an error.
pub fn record(conn: &Connection, step: &Step, checksum: &str) -> MigrateResult<AppliedStep> {
    let applied = AppliedStep {
        version: step.version,
        name: step.name.clone(),
        checksum: checksum.to_string(),
        applied_at: chrono::Utc::now().to_rfc3339(),
    };
    conn.execute(
        "INSERT INTO schema_migrations (version, name, checksum, applied_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            applied.version,
            applied.name,
            applied.checksum,
            applied.applied_at
        ],
    )
    .map_err(|e| {
        StoreError::with_context(e, format!("failed to record migration v{:03}", step.version))
    })?;
    Ok(applied)
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
