//! Schema migration engine for the observer statistics cache.
//!
//! Evolves a live SQLite store from whatever shape an earlier (possibly
//! incomplete) run left behind to the shape described by an ordered list of
//! [`Step`]s. Each step runs in one atomic unit, table rewrites preserve every
//! row through a [`Projection`] fallback chain, and an applied-steps ledger in
//! the same store makes re-running the engine a read-only no-op.

pub mod builtin;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod plan;
pub mod projection;
pub mod rewrite;
pub mod runner;
pub mod step;

pub use error::{MigrateError, MigrateResult};
pub use ledger::AppliedStep;
pub use lock::{LockHolder, MigrationLock};
pub use plan::{load_plan, validate_steps, MigrationPlan};
pub use projection::{ColumnSource, Projection, TargetColumn};
pub use rewrite::{IndexDef, Phase, RewriteExecutor, RewriteOutcome, RewritePlan};
pub use runner::{MigrationRunner, RunReport, RunnerOptions, StepState, StepStatus};
pub use step::{Action, ActionOutcome, Step};
