//! Built-in plan for the observer statistics cache.

use crate::error::MigrateResult;
use crate::plan::MigrationPlan;

/// YAML source of the built-in plan.
pub const OBSERVER_PLAN_YAML: &str = include_str!("schema/observer.yml");

/// The match/player cache schema history, validated.
pub fn observer_plan() -> MigrateResult<MigrationPlan> {
    MigrationPlan::from_yaml(OBSERVER_PLAN_YAML)
}
