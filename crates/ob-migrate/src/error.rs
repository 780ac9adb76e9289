//! Error types for the migration engine.

use ob_store::StoreError;
use thiserror::Error;

/// Migration engine errors.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Plan could not be loaded or failed validation (M001).
    #[error("[M001] Invalid migration plan: {0}")]
    InvalidPlan(String),

    /// Plan lists versions out of ascending order or twice (M002).
    #[error("[M002] Migration v{version:03} is listed after v{previous:03}; versions must be strictly ascending")]
    OutOfOrder { version: i64, previous: i64 },

    /// An unapplied step sits below the highest applied version (M003).
    #[error("[M003] Migration v{version:03} is pending but v{highest_applied:03} is already applied")]
    StaleStep { version: i64, highest_applied: i64 },

    /// Ledger records a step the plan does not know (M004).
    #[error("[M004] Store has migration v{version:03} applied, which this plan does not contain (migrated by a newer plan?)")]
    UnknownAppliedStep { version: i64 },

    /// A shipped step was edited after it was applied (M005).
    #[error("[M005] Migration v{version:03} changed after it was applied (ledger checksum {recorded}, plan checksum {current})")]
    ChecksumMismatch {
        version: i64,
        recorded: String,
        current: String,
    },

    /// Another runner holds the migration lock (M006).
    #[error("[M006] Store locked by another migration (owner {owner}, since {acquired_at}); retry later")]
    LockHeld { owner: String, acquired_at: String },

    /// This runner's lock was taken over mid-run (M007).
    #[error("[M007] Migration lock is no longer held by this runner ({0})")]
    LockLost(String),

    /// A rewrite would drop rows (M008).
    #[error("[M008] Rewrite of '{table}' would lose rows: {source_rows} source rows, {shadow_rows} copied")]
    RowLoss {
        table: String,
        source_rows: i64,
        shadow_rows: i64,
    },

    /// A step's atomic unit was abandoned (M009).
    #[error("[M009] Migration v{version:03} ({name}) failed and was rolled back")]
    StepFailed {
        version: i64,
        name: String,
        /// Versions committed earlier in the same invocation
        applied: Vec<i64>,
        #[source]
        source: Box<MigrateError>,
    },

    /// Store-layer failure (M010).
    #[error("[M010] {0}")]
    Store(#[from] StoreError),

    /// A step committed, but referential enforcement could not be turned
    /// back on afterwards, so the run stopped (M012).
    #[error("[M012] Migration v{version:03} ({name}) was applied, but foreign key enforcement could not be restored; remaining migrations were not run")]
    EnforcementNotRestored {
        version: i64,
        name: String,
        /// Versions committed in this invocation, including this one
        applied: Vec<i64>,
        #[source]
        source: StoreError,
    },

    /// A rewrite phase found the store in a state it cannot proceed from (M011).
    #[error("[M011] Rewrite of '{table}' cannot {phase}: {reason}")]
    PhaseOrder {
        table: String,
        phase: String,
        reason: String,
    },
}

/// Result type alias for [`MigrateError`].
pub type MigrateResult<T> = Result<T, MigrateError>;

impl From<rusqlite::Error> for MigrateError {
    fn from(err: rusqlite::Error) -> Self {
        MigrateError::Store(StoreError::from(err))
    }
}
