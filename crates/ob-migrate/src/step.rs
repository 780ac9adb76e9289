//! Migration steps and the actions they are made of.
//!
//! Steps are plain data (deserialized from YAML or built in code) so they can
//! be checksummed, validated before touching the store, and applied
//! repeatedly. Every action is existence-checked or idempotent on its own.

use crate::error::{MigrateError, MigrateResult};
use crate::rewrite::{IndexDef, RewriteExecutor, RewriteOutcome, RewritePlan};
use ob_core::compute_checksum;
use ob_core::sql_utils::quote_ident;
use ob_store::catalog::{probe, table_exists};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One forward schema change, applied in a single atomic unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Position in the plan; strictly ascending, never reused
    pub version: i64,
    pub name: String,
    /// Override for whether referential enforcement is suspended around the
    /// step. Defaults to suspending when any action rewrites a table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend_foreign_keys: Option<bool>,
    pub actions: Vec<Action>,
}

impl Step {
    pub fn new(version: i64, name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            version,
            name: name.into(),
            suspend_foreign_keys: None,
            actions,
        }
    }

    pub fn needs_foreign_key_suspension(&self) -> bool {
        self.suspend_foreign_keys
            .unwrap_or_else(|| self.actions.iter().any(|a| matches!(a, Action::Rewrite(_))))
    }

    /// SHA-256 of the step's canonical JSON form.
    pub fn checksum(&self) -> MigrateResult<String> {
        let canonical = serde_json::to_string(self).map_err(|e| {
            MigrateError::InvalidPlan(format!("cannot serialize {self} for checksum: {e}"))
        })?;
        Ok(compute_checksum(&canonical))
    }

    /// Structural checks that need no store.
    pub fn validate(&self) -> MigrateResult<()> {
        let fail = |msg: String| Err(MigrateError::InvalidPlan(format!("{self}: {msg}")));
        if self.version <= 0 {
            return fail("version must be a positive integer".to_string());
        }
        if self.name.trim().is_empty() {
            return fail("name is empty".to_string());
        }
        if self.actions.is_empty() {
            return fail("no actions".to_string());
        }
        for (i, action) in self.actions.iter().enumerate() {
            if let Err(msg) = action.validate() {
                return fail(format!("action {}: {msg}", i + 1));
            }
        }
        Ok(())
    }

    /// Apply every action in order on `conn`.
    ///
    /// The caller owns the atomic unit; a failing action leaves earlier ones
    /// for the caller to roll back.
    pub fn apply(&self, conn: &Connection) -> MigrateResult<Vec<ActionOutcome>> {
        let mut outcomes = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            let outcome = action.apply(conn)?;
            match &outcome {
                ActionOutcome::Skipped(reason) => {
                    log::warn!("{self}: skipped {}: {reason}", action.describe())
                }
                _ => log::debug!("{self}: {}", action.describe()),
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{:03} {}", self.version, self.name)
    }
}

/// A single idempotent change within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum Action {
    /// Raw SQL; must be idempotent (`IF NOT EXISTS` and the like)
    Sql {
        sql: String,
        /// Skip the action unless all of these tables exist
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        when_tables_exist: Vec<String>,
    },
    AddColumn {
        table: String,
        column: String,
        definition: String,
    },
    DropTable {
        table: String,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
    Rewrite(RewritePlan),
}

/// What applying an [`Action`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Executed,
    /// A precondition was absent; nothing was changed
    Skipped(String),
    Rewritten(RewriteOutcome),
}

impl Action {
    /// Short human-readable label for logs.
    pub fn describe(&self) -> String {
        match self {
            Action::Sql { sql, .. } => {
                let first = sql.lines().map(str::trim).find(|l| !l.is_empty());
                format!("sql `{}`", first.unwrap_or_default())
            }
            Action::AddColumn { table, column, .. } => format!("add column {table}.{column}"),
            Action::DropTable { table } => format!("drop table {table}"),
            Action::CreateIndex { name, table, .. } => format!("create index {name} on {table}"),
            Action::Rewrite(plan) => format!("rewrite {}", plan.table),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let require = |value: &str, what: &str| {
            if value.trim().is_empty() {
                Err(format!("{what} is empty"))
            } else {
                Ok(())
            }
        };
        match self {
            Action::Sql {
                sql,
                when_tables_exist,
            } => {
                require(sql, "sql")?;
                for table in when_tables_exist {
                    require(table, "when_tables_exist entry")?;
                }
                Ok(())
            }
            Action::AddColumn {
                table,
                column,
                definition,
            } => {
                require(table, "table")?;
                require(column, "column")?;
                require(definition, "definition")
            }
            Action::DropTable { table } => require(table, "table"),
            Action::CreateIndex {
                name,
                table,
                columns,
                ..
            } => {
                require(name, "index name")?;
                require(table, "table")?;
                if columns.is_empty() {
                    return Err(format!("index '{name}' has no columns"));
                }
                Ok(())
            }
            Action::Rewrite(plan) => plan.validate(),
        }
    }

    pub fn apply(&self, conn: &Connection) -> MigrateResult<ActionOutcome> {
        match self {
            Action::Sql {
                sql,
                when_tables_exist,
            } => {
                for table in when_tables_exist {
                    if !table_exists(conn, table)? {
                        return Ok(ActionOutcome::Skipped(format!("table '{table}' is absent")));
                    }
                }
                conn.execute_batch(sql)?;
                Ok(ActionOutcome::Executed)
            }
            Action::AddColumn {
                table,
                column,
                definition,
            } => {
                let found = probe(conn, table, &[column])?;
                if !found.exists {
                    return Ok(ActionOutcome::Skipped(format!("table '{table}' is absent")));
                }
                if found.has_column(column) {
                    return Ok(ActionOutcome::Skipped(format!(
                        "column '{table}.{column}' already exists"
                    )));
                }
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(column),
                    definition
                ))?;
                Ok(ActionOutcome::Executed)
            }
            Action::DropTable { table } => {
                if !table_exists(conn, table)? {
                    return Ok(ActionOutcome::Skipped(format!("table '{table}' is absent")));
                }
                conn.execute_batch(&format!("DROP TABLE {}", quote_ident(table)))?;
                Ok(ActionOutcome::Executed)
            }
            Action::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => {
                if !table_exists(conn, table)? {
                    return Ok(ActionOutcome::Skipped(format!("table '{table}' is absent")));
                }
                let index = IndexDef {
                    name: name.clone(),
                    columns: columns.clone(),
                    unique: *unique,
                };
                conn.execute_batch(&index.create_sql(table))?;
                Ok(ActionOutcome::Executed)
            }
            Action::Rewrite(plan) => RewriteExecutor::new(conn, plan)
                .execute()
                .map(ActionOutcome::Rewritten),
        }
    }
}

#[cfg(test)]
#[path = "step_test.rs"]
mod tests;
