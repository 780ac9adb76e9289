//! Configuration types and parsing for observer.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration from observer.yml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Statistics cache store connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Migration engine settings
    #[serde(default)]
    pub migrations: MigrationsConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite store (`:memory:` for an in-memory store)
    #[serde(default = "default_db_path")]
    pub path: String,

    /// How long a connection waits on another writer before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Busy timeout as a [`Duration`]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Whether the store lives only in memory
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// Migration engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// YAML plan file or directory of ordinal-prefixed step files.
    ///
    /// When unset, the built-in match/player cache plan is used.
    #[serde(default)]
    pub plan: Option<PathBuf>,

    /// Age after which a lock left by a dead runner may be taken over.
    ///
    /// `None` means a held lock is never taken over automatically; use
    /// `observer-migrate unlock` instead.
    #[serde(default = "default_lock_stale_after_secs")]
    pub lock_stale_after_secs: Option<u64>,

    /// Upper bound on a single step's atomic unit
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,

    /// Reject applied steps whose definition changed after shipping
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            plan: None,
            lock_stale_after_secs: default_lock_stale_after_secs(),
            step_timeout_secs: None,
            verify_checksums: true,
        }
    }
}

impl MigrationsConfig {
    /// Lock staleness window as a [`Duration`]
    pub fn lock_stale_after(&self) -> Option<Duration> {
        self.lock_stale_after_secs.map(Duration::from_secs)
    }

    /// Per-step timeout as a [`Duration`]
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

fn default_db_path() -> String {
    "matches.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_lock_stale_after_secs() -> Option<u64> {
    Some(900)
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;

        // Relative plan paths are resolved against the config file's directory
        if let (Some(plan), Some(dir)) = (config.migrations.plan.as_ref(), path.parent()) {
            if plan.is_relative() {
                config.migrations.plan = Some(dir.join(plan));
            }
        }
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for observer.yml or observer.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("observer.yml");
        let yaml_path = dir.join("observer.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "database.path cannot be empty".to_string(),
            });
        }
        if self.migrations.step_timeout_secs == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "migrations.step_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.migrations.lock_stale_after_secs == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "migrations.lock_stale_after_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
