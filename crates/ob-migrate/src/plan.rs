//! Loading and validating ordered step lists.
//!
//! A plan comes from one of three places: the built-in observer plan, a YAML
//! file with a `steps:` list, or a directory of `NNN_<name>.sql` and
//! `NNN_<name>.yml` files whose numeric prefix is the step version.

use crate::builtin;
use crate::error::{MigrateError, MigrateResult};
use crate::step::{Action, Step};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationPlan {
    pub steps: Vec<Step>,
}

/// A step file inside a plan directory; the version comes from the filename.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    suspend_foreign_keys: Option<bool>,
    actions: Vec<Action>,
}

enum StepFileKind {
    Sql,
    Yaml,
}

impl MigrationPlan {
    /// Parse and validate a YAML plan document.
    pub fn from_yaml(content: &str) -> MigrateResult<Self> {
        let plan: MigrationPlan = serde_yaml::from_str(content)
            .map_err(|e| MigrateError::InvalidPlan(format!("YAML parse error: {e}")))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load a YAML plan file.
    pub fn from_file(path: &Path) -> MigrateResult<Self> {
        let content = read(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            MigrateError::InvalidPlan(msg) => {
                MigrateError::InvalidPlan(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Load every `NNN_<name>.{sql,yml,yaml}` file in `dir`, ordered by the
    /// numeric prefix. Other files are ignored.
    pub fn from_dir(dir: &Path) -> MigrateResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            MigrateError::InvalidPlan(format!("cannot read {}: {e}", dir.display()))
        })?;

        let mut steps = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrateError::InvalidPlan(format!("cannot read {}: {e}", dir.display()))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((version, name, kind)) = parse_file_name(file_name)? else {
                log::debug!("Ignoring non-step file {}", path.display());
                continue;
            };

            let content = read(&path)?;
            let step = match kind {
                StepFileKind::Sql => Step::new(
                    version,
                    name,
                    vec![Action::Sql {
                        sql: content,
                        when_tables_exist: Vec::new(),
                    }],
                ),
                StepFileKind::Yaml => {
                    let body: StepBody = serde_yaml::from_str(&content).map_err(|e| {
                        MigrateError::InvalidPlan(format!("{}: {e}", path.display()))
                    })?;
                    Step {
                        version,
                        name: body.name.unwrap_or(name),
                        suspend_foreign_keys: body.suspend_foreign_keys,
                        actions: body.actions,
                    }
                }
            };
            steps.push(step);
        }
        steps.sort_by_key(|s| s.version);

        let plan = MigrationPlan { steps };
        plan.validate()?;
        Ok(plan)
    }

    /// Validate every step and the ordering between them.
    pub fn validate(&self) -> MigrateResult<()> {
        validate_steps(&self.steps)
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }
}

/// Load the plan at `path`, or the built-in observer plan when `None`.
pub fn load_plan(path: Option<&Path>) -> MigrateResult<MigrationPlan> {
    match path {
        None => builtin::observer_plan(),
        Some(p) if p.is_dir() => MigrationPlan::from_dir(p),
        Some(p) if p.is_file() => MigrationPlan::from_file(p),
        Some(p) => Err(MigrateError::InvalidPlan(format!(
            "plan not found: {}",
            p.display()
        ))),
    }
}

/// Check each step's structure and that versions strictly ascend.
pub fn validate_steps(steps: &[Step]) -> MigrateResult<()> {
    let mut previous: Option<i64> = None;
    for step in steps {
        step.validate()?;
        if let Some(prev) = previous {
            if step.version <= prev {
                return Err(MigrateError::OutOfOrder {
                    version: step.version,
                    previous: prev,
                });
            }
        }
        previous = Some(step.version);
    }
    Ok(())
}

fn read(path: &Path) -> MigrateResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| MigrateError::InvalidPlan(format!("cannot read {}: {e}", path.display())))
}

/// `003_simplify_players.yml` -> `(3, "simplify_players", Yaml)`.
///
/// `Ok(None)` for files that are not step files at all; an error for step
/// files with a malformed prefix.
fn parse_file_name(file_name: &str) -> MigrateResult<Option<(i64, String, StepFileKind)>> {
    let (stem, kind) = if let Some(stem) = file_name.strip_suffix(".sql") {
        (stem, StepFileKind::Sql)
    } else if let Some(stem) = file_name
        .strip_suffix(".yml")
        .or_else(|| file_name.strip_suffix(".yaml"))
    {
        (stem, StepFileKind::Yaml)
    } else {
        return Ok(None);
    };

    let malformed = || {
        MigrateError::InvalidPlan(format!(
            "step file '{file_name}' must be named NNN_<name> with a numeric prefix"
        ))
    };
    let (prefix, name) = stem.split_once('_').ok_or_else(malformed)?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return Err(malformed());
    }
    let version = prefix.parse::<i64>().map_err(|_| malformed())?;
    Ok(Some((version, name.to_string(), kind)))
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
