//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use ob_core::Config;
use ob_migrate::{load_plan, MigrationRunner, RunnerOptions, Step};
use ob_store::StoreDb;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run (lock release, foreign key restore).
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; main.rs reports the code, not this text
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Load the config file and apply command-line overrides.
///
/// Without `--config`, `./observer.yml` (or `.yaml`) is used when present
/// and built-in defaults otherwise.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    let mut config = match &global.config {
        Some(path) => Config::load(Path::new(path))
            .with_context(|| format!("Failed to load config {path}"))?,
        None => {
            let cwd = Path::new(".");
            if cwd.join("observer.yml").exists() || cwd.join("observer.yaml").exists() {
                Config::load_from_dir(cwd).context("Failed to load config")?
            } else {
                Config::default()
            }
        }
    };

    if let Some(database) = &global.database {
        config.database.path = database.clone();
    }
    if let Some(plan) = &global.plan {
        config.migrations.plan = Some(PathBuf::from(plan));
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Load the configured plan (built-in when none is set).
pub(crate) fn load_steps(config: &Config) -> Result<Vec<Step>> {
    let plan = load_plan(config.migrations.plan.as_deref()).context("Failed to load plan")?;
    Ok(plan.into_steps())
}

/// How a command may open the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreAccess {
    /// Create the store file if it is missing
    Create,
    /// Fail instead of creating a file at a mistyped path
    Existing,
}

/// Open the store and run `work` against it on a blocking thread.
pub(crate) async fn with_runner<T, F>(
    config: Config,
    steps: Vec<Step>,
    access: StoreAccess,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&MigrationRunner<'_>, &[Step]) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let db = open_store(&config, access)?;
        let runner = MigrationRunner::new(&db, RunnerOptions::from(&config.migrations));
        work(&runner, &steps)
    })
    .await
    .context("Store task panicked")?
}

/// Open the configured store.
pub(crate) fn open_store(config: &Config, access: StoreAccess) -> Result<StoreDb> {
    log::debug!("Opening store {} ({access:?})", config.database.path);
    let db = match access {
        StoreAccess::Create => StoreDb::open_with_config(&config.database),
        StoreAccess::Existing => StoreDb::open_existing_with_config(&config.database),
    };
    db.with_context(|| format!("Failed to open store {}", config.database.path))
}

/// Print a formatted table with headers and rows.
///
/// Calculates column widths automatically from headers and data.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(String::len)
                .max()
                .unwrap_or(0)
                .max(h.len())
        })
        .collect();

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  "));

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
