//! Migration runner: ordered, exactly-once application of steps.
//!
//! The runner reconciles the plan against the ledger before touching the
//! store, takes the migration lock only when there is pending work, and
//! applies each pending step in its own atomic unit:
//!
//! ```text
//! suspend FKs (if needed) -> BEGIN IMMEDIATE -> verify lock -> actions
//!   -> foreign_key_check -> ledger record -> COMMIT -> restore FKs
//! ```

use crate::error::{MigrateError, MigrateResult};
use crate::ledger::{self, AppliedStep};
use crate::lock::{self, LockHolder, MigrationLock};
use crate::plan::validate_steps;
use crate::step::Step;
use ob_core::MigrationsConfig;
use ob_store::{ForeignKeyGuard, StoreDb, StoreResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Take over a lock held longer than this; `None` never takes over
    pub lock_stale_after: Option<Duration>,
    /// Deadline for each step's atomic unit
    pub step_timeout: Option<Duration>,
    /// Fail when an applied step's checksum no longer matches the plan
    pub verify_checksums: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            lock_stale_after: Some(Duration::from_secs(900)),
            step_timeout: None,
            verify_checksums: true,
        }
    }
}

impl From<&MigrationsConfig> for RunnerOptions {
    fn from(config: &MigrationsConfig) -> Self {
        Self {
            lock_stale_after: config.lock_stale_after(),
            step_timeout: config.step_timeout(),
            verify_checksums: config.verify_checksums,
        }
    }
}

/// Whether a step has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Applied,
}

/// One row of [`MigrationRunner::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatus {
    pub version: i64,
    pub name: String,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
}

/// Result of a successful [`MigrationRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Steps committed by this invocation, in order
    pub applied: Vec<AppliedStep>,
    /// Steps that were already in the ledger
    pub already_applied: usize,
}

impl RunReport {
    pub fn applied_versions(&self) -> Vec<i64> {
        self.applied.iter().map(|a| a.version).collect()
    }
}

/// Applies a plan to one store.
pub struct MigrationRunner<'a> {
    db: &'a StoreDb,
    options: RunnerOptions,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a StoreDb, options: RunnerOptions) -> Self {
        Self { db, options }
    }

    /// Per-step state. Never writes.
    ///
    /// Ledger entries the plan does not know are listed too, after the plan's
    /// own steps.
    pub fn status(&self, steps: &[Step]) -> MigrateResult<Vec<StepStatus>> {
        validate_steps(steps)?;
        let mut applied: BTreeMap<i64, AppliedStep> = ledger::load(self.db.conn())?
            .into_iter()
            .map(|a| (a.version, a))
            .collect();

        let mut rows: Vec<StepStatus> = steps
            .iter()
            .map(|step| match applied.remove(&step.version) {
                Some(record) => StepStatus {
                    version: step.version,
                    name: step.name.clone(),
                    state: StepState::Applied,
                    applied_at: Some(record.applied_at),
                },
                None => StepStatus {
                    version: step.version,
                    name: step.name.clone(),
                    state: StepState::Pending,
                    applied_at: None,
                },
            })
            .collect();
        rows.extend(applied.into_values().map(|record| StepStatus {
            version: record.version,
            name: record.name,
            state: StepState::Applied,
            applied_at: Some(record.applied_at),
        }));
        Ok(rows)
    }

    /// Who holds the migration lock right now, if anyone. Never writes.
    pub fn lock_holder(&self) -> MigrateResult<Option<LockHolder>> {
        lock::current_holder(self.db.conn())
    }

    /// Remove the migration lock regardless of owner.
    pub fn force_unlock(&self) -> MigrateResult<Option<LockHolder>> {
        let holder = lock::force_release(self.db.conn())?;
        if let Some(h) = &holder {
            log::warn!("Force-released migration lock held by {} since {}", h.owner, h.acquired_at);
        }
        Ok(holder)
    }

    /// Steps a run would apply, after full reconciliation. Never writes.
    pub fn pending<'s>(&self, steps: &'s [Step]) -> MigrateResult<Vec<&'s Step>> {
        let applied = ledger::load(self.db.conn())?;
        self.reconcile(steps, &applied)
    }

    /// Apply every pending step in order.
    ///
    /// Stops at the first failing step; steps committed before it stay
    /// committed and are listed in the returned [`MigrateError::StepFailed`].
    pub fn run(&self, steps: &[Step]) -> MigrateResult<RunReport> {
        let applied = ledger::load(self.db.conn())?;
        let pending = self.reconcile(steps, &applied)?;
        if pending.is_empty() {
            log::info!("Store is up to date ({} steps applied)", applied.len());
            return Ok(RunReport {
                applied: Vec::new(),
                already_applied: applied.len(),
            });
        }

        let lock = MigrationLock::acquire(self.db, self.options.lock_stale_after)?;

        // Another runner may have finished while we waited for the lock
        let applied = ledger::load(self.db.conn())?;
        let pending = self.reconcile(steps, &applied)?;
        log::info!("{} pending migration(s)", pending.len());

        let mut report = RunReport {
            applied: Vec::new(),
            already_applied: applied.len(),
        };
        for step in pending {
            match self.apply_step(step, &lock) {
                Ok(record) => report.applied.push(record),
                Err(MigrateError::EnforcementNotRestored {
                    version,
                    name,
                    source,
                    ..
                }) => {
                    log::error!("{step} committed but foreign key enforcement is off: {source}");
                    let mut applied = report.applied_versions();
                    applied.push(version);
                    return Err(MigrateError::EnforcementNotRestored {
                        version,
                        name,
                        applied,
                        source,
                    });
                }
                Err(source) => {
                    log::error!("{step} failed: {source}");
                    return Err(MigrateError::StepFailed {
                        version: step.version,
                        name: step.name.clone(),
                        applied: report.applied_versions(),
                        source: Box::new(source),
                    });
                }
            }
        }

        lock.release()?;
        Ok(report)
    }

    /// Check the plan against the ledger and return the pending steps.
    fn reconcile<'s>(
        &self,
        steps: &'s [Step],
        applied: &[AppliedStep],
    ) -> MigrateResult<Vec<&'s Step>> {
        validate_steps(steps)?;
        let by_version: BTreeMap<i64, &Step> = steps.iter().map(|s| (s.version, s)).collect();

        for record in applied {
            let step = by_version
                .get(&record.version)
                .ok_or(MigrateError::UnknownAppliedStep {
                    version: record.version,
                })?;
            if self.options.verify_checksums {
                let current = step.checksum()?;
                if current != record.checksum {
                    return Err(MigrateError::ChecksumMismatch {
                        version: record.version,
                        recorded: record.checksum.clone(),
                        current,
                    });
                }
            }
        }

        let highest_applied = applied.iter().map(|a| a.version).max();
        let pending: Vec<&Step> = steps
            .iter()
            .filter(|s| !applied.iter().any(|a| a.version == s.version))
            .collect();
        if let (Some(highest), Some(first)) = (highest_applied, pending.first()) {
            if first.version < highest {
                return Err(MigrateError::StaleStep {
                    version: first.version,
                    highest_applied: highest,
                });
            }
        }
        Ok(pending)
    }

    /// Apply one step in its own atomic unit and record it.
    fn apply_step(&self, step: &Step, lock: &MigrationLock<'_>) -> MigrateResult<AppliedStep> {
        log::info!("Applying {step}");
        let started = Instant::now();
        let checksum = step.checksum()?;

        let guard = if step.needs_foreign_key_suspension() {
            Some(ForeignKeyGuard::suspend(self.db.conn())?)
        } else {
            None
        };

        let result = self
            .db
            .transaction_with_deadline(self.options.step_timeout, |conn| {
                lock.verify(conn)?;
                ledger::ensure_table(conn)?;
                step.apply(conn)?;
                if let Some(guard) = guard.as_ref().filter(|g| g.was_enabled()) {
                    guard.check()?;
                }
                ledger::record(conn, step, &checksum)
            });

        let restored = match guard {
            Some(guard) => guard.restore(),
            None => Ok(()),
        };
        let record = settle(step, result, restored)?;
        log::info!("Applied {step} in {}ms", started.elapsed().as_millis());
        Ok(record)
    }
}

/// Combine a step's unit result with the outcome of restoring enforcement.
///
/// The unit has already committed or rolled back, so a restore failure never
/// turns a committed step into a rolled-back one.
fn settle(
    step: &Step,
    unit: MigrateResult<AppliedStep>,
    restored: StoreResult<()>,
) -> MigrateResult<AppliedStep> {
    match (unit, restored) {
        (Ok(record), Ok(())) => Ok(record),
        (Ok(record), Err(source)) => Err(MigrateError::EnforcementNotRestored {
            version: record.version,
            name: record.name,
            applied: Vec::new(),
            source,
        }),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(restore_err)) => {
            log::warn!("Failed to restore foreign key enforcement after {step}: {restore_err}");
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
