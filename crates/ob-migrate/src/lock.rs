//! Advisory migration lock.
//!
//! A single-row table in the store marks which runner is migrating it. The
//! row is claimed in its own `BEGIN IMMEDIATE` unit before the first step,
//! re-verified inside every step unit, and deleted when the run ends.

use crate::error::{MigrateError, MigrateResult};
use ob_store::catalog::table_exists;
use ob_store::StoreDb;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::time::Duration;

/// Name of the lock table.
pub const LOCK_TABLE: &str = "schema_migrations_lock";

/// Who holds the lock and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolder {
    pub owner: String,
    /// RFC 3339 acquisition time
    pub acquired_at: String,
}

impl LockHolder {
    /// Whether the lock has been held for at least `window`.
    ///
    /// An unreadable timestamp counts as stale.
    pub fn is_stale(&self, window: Duration) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&self.acquired_at) {
            Ok(acquired) => (chrono::Utc::now() - acquired.with_timezone(&chrono::Utc))
                .to_std()
                .map_or(false, |age| age >= window),
            Err(_) => true,
        }
    }
}

/// Lock held by this runner. Released on [`release`](Self::release) or drop.
pub struct MigrationLock<'a> {
    db: &'a StoreDb,
    owner: String,
    released: bool,
}

impl std::fmt::Debug for MigrationLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationLock")
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<'a> MigrationLock<'a> {
    /// Claim the lock, taking over a holder older than `stale_after`.
    pub fn acquire(db: &'a StoreDb, stale_after: Option<Duration>) -> MigrateResult<Self> {
        let owner = format!("pid{}-{}", std::process::id(), uuid::Uuid::new_v4());
        db.transaction(|conn| -> MigrateResult<()> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations_lock (
                     id          INTEGER PRIMARY KEY CHECK (id = 1),
                     owner       TEXT NOT NULL,
                     acquired_at TEXT NOT NULL
                 );",
            )?;
            if let Some(holder) = current_holder(conn)? {
                match stale_after {
                    Some(window) if holder.is_stale(window) => {
                        log::warn!(
                            "Taking over stale migration lock held by {} since {}",
                            holder.owner,
                            holder.acquired_at
                        );
                        conn.execute("DELETE FROM schema_migrations_lock WHERE id = 1", [])?;
                    }
                    _ => {
                        return Err(MigrateError::LockHeld {
                            owner: holder.owner,
                            acquired_at: holder.acquired_at,
                        })
                    }
                }
            }
            conn.execute(
                "INSERT INTO schema_migrations_lock (id, owner, acquired_at) VALUES (1, ?1, ?2)",
                params![owner, chrono::Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })?;
        log::debug!("Acquired migration lock as {owner}");
        Ok(Self {
            db,
            owner,
            released: false,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Confirm this runner still holds the lock. Call inside a step's unit.
    pub fn verify(&self, conn: &Connection) -> MigrateResult<()> {
        match current_holder(conn)? {
            Some(holder) if holder.owner == self.owner => Ok(()),
            Some(holder) => Err(MigrateError::LockLost(format!(
                "taken over by {} at {}",
                holder.owner, holder.acquired_at
            ))),
            None => Err(MigrateError::LockLost("lock row is gone".to_string())),
        }
    }

    /// Delete the lock row if this runner still owns it.
    pub fn release(mut self) -> MigrateResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> MigrateResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let deleted = self.db.conn().execute(
            "DELETE FROM schema_migrations_lock WHERE id = 1 AND owner = ?1",
            [&self.owner],
        )?;
        if deleted == 0 {
            log::warn!("Migration lock for {} was already gone at release", self.owner);
        } else {
            log::debug!("Released migration lock {}", self.owner);
        }
        Ok(())
    }
}

impl Drop for MigrationLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            log::warn!("Failed to release migration lock: {e}");
        }
    }
}

/// Current lock holder, if any. Never writes.
pub fn current_holder(conn: &Connection) -> MigrateResult<Option<LockHolder>> {
    if !table_exists(conn, LOCK_TABLE)? {
        return Ok(None);
    }
    let holder = conn
        .query_row(
            "SELECT owner, acquired_at FROM schema_migrations_lock WHERE id = 1",
            [],
            |row| {
                Ok(LockHolder {
                    owner: row.get(0)?,
                    acquired_at: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(holder)
}

/// Remove the lock regardless of owner, returning who held it.
pub fn force_release(conn: &Connection) -> MigrateResult<Option<LockHolder>> {
    let holder = current_holder(conn)?;
    if holder.is_some() {
        conn.execute("DELETE FROM schema_migrations_lock WHERE id = 1", [])?;
    }
    Ok(holder)
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
