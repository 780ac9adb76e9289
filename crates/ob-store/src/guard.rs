//! Foreign-key enforcement suspension around structural rewrites.
//!
//! SQLite ignores `PRAGMA foreign_keys` inside an open transaction, so the
//! guard is taken before the atomic unit begins and restored after it ends.
//! Inside the unit, [`ForeignKeyGuard::check`] re-validates every reference so
//! a rewrite that leaves dangling rows is abandoned instead of committed.

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::fmt;

/// A row that references a missing parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    /// Child table holding the dangling reference
    pub table: String,
    /// Rowid of the offending row (`None` for WITHOUT ROWID tables)
    pub rowid: Option<i64>,
    /// Parent table the reference points to
    pub parent: String,
}

impl fmt::Display for ForeignKeyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rowid {
            Some(rowid) => write!(f, "{}[rowid {}] -> {}", self.table, rowid, self.parent),
            None => write!(f, "{} -> {}", self.table, self.parent),
        }
    }
}

/// Read the connection's current enforcement state.
pub fn foreign_keys_enabled(conn: &Connection) -> StoreResult<bool> {
    let on: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .map_err(|e| StoreError::with_context(e, "failed to read foreign_keys"))?;
    Ok(on != 0)
}

fn set_foreign_keys(conn: &Connection, on: bool) -> StoreResult<()> {
    let sql = if on {
        "PRAGMA foreign_keys = ON"
    } else {
        "PRAGMA foreign_keys = OFF"
    };
    conn.execute_batch(sql)
        .map_err(|e| StoreError::with_context(e, "failed to set foreign_keys"))?;
    if foreign_keys_enabled(conn)? != on {
        return Err(StoreError::TransactionError(
            "foreign key enforcement cannot change while an atomic unit is open".to_string(),
        ));
    }
    Ok(())
}

/// Suspends referential enforcement until restored or dropped.
pub struct ForeignKeyGuard<'c> {
    conn: &'c Connection,
    was_enabled: bool,
    restored: bool,
}

impl<'c> ForeignKeyGuard<'c> {
    /// Turn enforcement off, remembering the previous state.
    ///
    /// Fails if an atomic unit is already open on `conn`.
    pub fn suspend(conn: &'c Connection) -> StoreResult<Self> {
        if !conn.is_autocommit() {
            return Err(StoreError::TransactionError(
                "foreign key enforcement must be suspended before the atomic unit begins"
                    .to_string(),
            ));
        }
        let was_enabled = foreign_keys_enabled(conn)?;
        if was_enabled {
            set_foreign_keys(conn, false)?;
            log::debug!("Foreign key enforcement suspended");
        }
        Ok(Self {
            conn,
            was_enabled,
            restored: false,
        })
    }

    /// Whether enforcement was on before the guard was taken.
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }

    /// Verify every foreign key in the store, failing on any dangling row.
    ///
    /// Runs inside the unit; a failure here abandons the step.
    pub fn check(&self) -> StoreResult<()> {
        let violations = foreign_key_violations(self.conn)?;
        if violations.is_empty() {
            Ok(())
        } else {
            Err(StoreError::ForeignKeyViolation(violations))
        }
    }

    /// Put enforcement back the way it was.
    pub fn restore(mut self) -> StoreResult<()> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> StoreResult<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        if self.was_enabled {
            set_foreign_keys(self.conn, true)?;
            log::debug!("Foreign key enforcement restored");
        }
        Ok(())
    }
}

impl Drop for ForeignKeyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            log::warn!("Failed to restore foreign key enforcement: {e}");
        }
    }
}

/// List every row that currently violates a foreign key.
pub fn foreign_key_violations(conn: &Connection) -> StoreResult<Vec<ForeignKeyViolation>> {
    let mut stmt = conn
        .prepare("PRAGMA foreign_key_check")
        .map_err(|e| StoreError::with_context(e, "foreign_key_check"))?;
    let violations = stmt
        .query_map([], |row| {
            Ok(ForeignKeyViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
            })
        })
        .map_err(|e| StoreError::with_context(e, "foreign_key_check"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::with_context(e, "foreign_key_check row"))?;
    Ok(violations)
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
