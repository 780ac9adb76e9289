//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};

/// observer-migrate - evolve the observer statistics cache to the current schema
#[derive(Parser, Debug)]
#[command(name = "observer-migrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ./observer.yml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the store path
    #[arg(long, global = true, env = "OBSERVER_DATABASE")]
    pub database: Option<String>,

    /// Override the migration plan (YAML file or step directory)
    #[arg(long, global = true)]
    pub plan: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Run(RunArgs),

    /// Show applied and pending migrations
    Status(StatusArgs),

    /// Load and validate the plan without opening the store
    Validate,

    /// Force-release the migration lock left by a crashed runner
    Unlock,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// List pending migrations without applying them
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
