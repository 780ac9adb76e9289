//! Store connection wrapper.
//!
//! [`StoreDb`] owns a SQLite [`Connection`] to the statistics cache and
//! provides helpers for opening it and running atomic units against it.

use crate::error::{StoreError, StoreResult};
use ob_core::DatabaseConfig;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Number of SQLite VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

/// Connection-level settings applied on open.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long to wait for another writer before failing with `Busy`
    pub busy_timeout: Duration,
    /// Turn on referential enforcement for this connection
    pub enforce_foreign_keys: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            enforce_foreign_keys: true,
        }
    }
}

impl From<&DatabaseConfig> for StoreOptions {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            busy_timeout: config.busy_timeout(),
            ..Self::default()
        }
    }
}

/// Wrapper around a SQLite connection to the statistics cache.
///
/// Single-threaded: one runner owns one connection for the whole invocation.
pub struct StoreDb {
    conn: Connection,
    path: Option<PathBuf>,
}

impl StoreDb {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path, options: &StoreOptions) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::ConnectionError(format!("{e}: {}", path.display())))?;
        Self::from_connection(conn, Some(path), options)
    }

    /// Open the store at `path` only if it already exists; never creates a
    /// file.
    pub fn open_existing(path: &Path, options: &StoreOptions) -> StoreResult<Self> {
        if !path.is_file() {
            return Err(StoreError::ConnectionError(format!(
                "store does not exist: {}",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StoreError::ConnectionError(format!("{e}: {}", path.display())))?;
        Self::from_connection(conn, Some(path), options)
    }

    /// Create an in-memory store.
    ///
    /// Useful for unit tests that don't need persistence.
    pub fn open_memory() -> StoreResult<Self> {
        Self::memory(&StoreOptions::default())
    }

    /// Open the store described by a config section (handles `:memory:`).
    pub fn open_with_config(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = StoreOptions::from(config);
        if config.is_in_memory() {
            Self::memory(&options)
        } else {
            Self::open(Path::new(&config.path), &options)
        }
    }

    /// Like [`open_with_config`](Self::open_with_config), but a file-backed
    /// store must already exist.
    pub fn open_existing_with_config(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = StoreOptions::from(config);
        if config.is_in_memory() {
            Self::memory(&options)
        } else {
            Self::open_existing(Path::new(&config.path), &options)
        }
    }

    fn memory(options: &StoreOptions) -> StoreResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        Self::from_connection(conn, None, options)
    }

    fn from_connection(
        conn: Connection,
        path: Option<&Path>,
        options: &StoreOptions,
    ) -> StoreResult<Self> {
        configure(&conn, options)?;
        Ok(Self {
            conn,
            path: path.map(Path::to_path_buf),
        })
    }

    /// Borrow the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Filesystem location of the store, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether referential enforcement is currently on for this connection.
    pub fn foreign_keys_enabled(&self) -> StoreResult<bool> {
        crate::guard::foreign_keys_enabled(&self.conn)
    }

    /// Execute `body` within a `BEGIN IMMEDIATE` / `COMMIT` unit, rolling back
    /// on error.
    pub fn transaction<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.transaction_with_deadline(None, body)
    }

    /// Like [`transaction`](Self::transaction), but any statement still
    /// running once `timeout` has elapsed is interrupted, which abandons the
    /// whole unit.
    pub fn transaction_with_deadline<F, T, E>(
        &self,
        timeout: Option<Duration>,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        if !self.conn.is_autocommit() {
            return Err(StoreError::TransactionError(
                "an atomic unit is already open on this connection".to_string(),
            )
            .into());
        }

        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| match StoreError::from(e) {
                StoreError::Sqlite(inner) => {
                    StoreError::TransactionError(format!("BEGIN failed: {inner}"))
                }
                other => other,
            })?;

        if let Some(timeout) = timeout {
            let deadline = Instant::now() + timeout;
            self.conn
                .progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        }

        let result = body(&self.conn);

        if timeout.is_some() {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }

        match &result {
            Ok(_) => {
                if let Err(commit_err) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(StoreError::TransactionError(format!(
                        "COMMIT failed: {commit_err}"
                    ))
                    .into());
                }
            }
            // SQLite may already have rolled back after an interrupt
            Err(_) if self.conn.is_autocommit() => {}
            Err(_) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("ROLLBACK failed: {rollback_err}");
                }
            }
        }
        result
    }
}

fn configure(conn: &Connection, options: &StoreOptions) -> StoreResult<()> {
    conn.busy_timeout(options.busy_timeout)
        .map_err(|e| StoreError::ConnectionError(format!("failed to set busy timeout: {e}")))?;
    let pragma = if options.enforce_foreign_keys {
        "PRAGMA foreign_keys = ON;"
    } else {
        "PRAGMA foreign_keys = OFF;"
    };
    conn.execute_batch(pragma)
        .map_err(|e| StoreError::ConnectionError(format!("failed to set foreign_keys: {e}")))?;
    Ok(())
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
