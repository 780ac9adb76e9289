//! Table rewrite: create shadow, copy rows, drop original, rename shadow.
//!
//! Each phase is existence-checked or duplicate-tolerant, so replaying the
//! sequence from the first phase after an interruption converges on the same
//! end state. The executor itself opens no transaction; the runner wraps the
//! whole step in one atomic unit.

use crate::error::{MigrateError, MigrateResult};
use crate::projection::{Projection, TargetColumn};
use ob_core::sql_utils::{quote_ident, quote_ident_list};
use ob_store::catalog::{probe, table_exists, table_shape};
use ob_store::TableShape;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Suffix appended to a table's name to form its shadow table.
pub const SHADOW_SUFFIX: &str = "__shadow";

/// An index declared on the rewritten table, recreated after the rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// `CREATE INDEX IF NOT EXISTS` statement for `table`.
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_ident(&self.name),
            quote_ident(table),
            quote_ident_list(&self.columns)
        )
    }
}

/// Target shape of a table plus how to carry legacy rows into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewritePlan {
    /// Table being reshaped
    pub table: String,
    /// Columns of the new shape, in order
    pub columns: Vec<TargetColumn>,
    /// Table constraints, e.g. `FOREIGN KEY (x) REFERENCES y(x)`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    /// Indexes recreated on the new table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDef>,
}

impl RewritePlan {
    pub fn shadow_name(&self) -> String {
        format!("{}{}", self.table, SHADOW_SUFFIX)
    }

    /// Column names of the new shape.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn projection(&self) -> Projection<'_> {
        Projection::new(&self.columns)
    }

    /// `CREATE TABLE IF NOT EXISTS` for the shadow table.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.definition))
            .collect();
        parts.extend(self.constraints.iter().cloned());
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.shadow_name()),
            parts.join(",\n    ")
        )
    }

    /// Shape the target declaration produces, read back from a scratch
    /// in-memory database so the store itself is never written.
    pub fn target_shape(&self) -> MigrateResult<TableShape> {
        let scratch = Connection::open_in_memory()?;
        scratch.execute_batch(&self.create_sql())?;
        table_shape(&scratch, &self.shadow_name())?.ok_or_else(|| {
            MigrateError::InvalidPlan(format!(
                "rewrite of '{}' did not produce a table",
                self.table
            ))
        })
    }

    /// Structural checks that need no store.
    pub fn validate(&self) -> Result<(), String> {
        if self.table.trim().is_empty() {
            return Err("rewrite has an empty table name".to_string());
        }
        if self.table.ends_with(SHADOW_SUFFIX) {
            return Err(format!(
                "rewrite target '{}' uses the reserved '{SHADOW_SUFFIX}' suffix",
                self.table
            ));
        }
        if self.columns.is_empty() {
            return Err(format!("rewrite of '{}' declares no columns", self.table));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(format!("rewrite of '{}' has an unnamed column", self.table));
            }
            if column.definition.trim().is_empty() {
                return Err(format!(
                    "column '{}.{}' has an empty definition",
                    self.table, column.name
                ));
            }
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(format!(
                    "column '{}.{}' is declared twice",
                    self.table, column.name
                ));
            }
        }

        for index in &self.indexes {
            if index.name.trim().is_empty() || index.columns.is_empty() {
                return Err(format!(
                    "index on '{}' needs a name and at least one column",
                    self.table
                ));
            }
            if let Some(col) = index
                .columns
                .iter()
                .find(|c| !seen.contains(&c.to_ascii_lowercase()))
            {
                return Err(format!(
                    "index '{}' references '{}', which is not a column of '{}'",
                    index.name, col, self.table
                ));
            }
        }
        Ok(())
    }
}

/// The four rewrite phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CreateShadow,
    CopyRows,
    DropOriginal,
    RenameShadow,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::CreateShadow,
        Phase::CopyRows,
        Phase::DropOriginal,
        Phase::RenameShadow,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::CreateShadow => "create shadow",
            Phase::CopyRows => "copy rows",
            Phase::DropOriginal => "drop original",
            Phase::RenameShadow => "rename shadow",
        };
        f.write_str(name)
    }
}

/// What a rewrite did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub table: String,
    /// The table already had the target shape; nothing was rebuilt
    pub already_current: bool,
    /// A table with the target name existed before the rewrite
    pub legacy_present: bool,
    /// Rows inserted into the shadow table by this run
    pub rows_copied: usize,
}

/// Runs a [`RewritePlan`] against a connection.
pub struct RewriteExecutor<'a> {
    conn: &'a Connection,
    plan: &'a RewritePlan,
}

impl<'a> RewriteExecutor<'a> {
    pub fn new(conn: &'a Connection, plan: &'a RewritePlan) -> Self {
        Self { conn, plan }
    }

    /// Bring the table to the target shape.
    ///
    /// A table counts as current only when its full declaration matches:
    /// column names, types, nullability, defaults, keys, foreign keys and
    /// `UNIQUE` constraints. Matching names alone still get rewritten so the
    /// fallback chains fill every column.
    pub fn execute(&self) -> MigrateResult<RewriteOutcome> {
        let table = &self.plan.table;
        let legacy_present = table_exists(self.conn, table)?;
        let shadow_present = table_exists(self.conn, &self.plan.shadow_name())?;

        if legacy_present && !shadow_present {
            let live = table_shape(self.conn, table)?;
            if live.as_ref() == Some(&self.plan.target_shape()?) {
                log::debug!("Table '{table}' already has the target shape");
                self.ensure_indexes()?;
                return Ok(RewriteOutcome {
                    table: table.clone(),
                    already_current: true,
                    legacy_present,
                    rows_copied: 0,
                });
            }
        }

        let mut rows_copied = 0;
        for phase in Phase::ALL {
            rows_copied += self.run_phase(phase)?;
        }
        self.ensure_indexes()?;

        Ok(RewriteOutcome {
            table: table.clone(),
            already_current: false,
            legacy_present,
            rows_copied,
        })
    }

    /// Run a single phase. Returns the number of rows copied (zero for every
    /// phase but [`Phase::CopyRows`]).
    pub fn run_phase(&self, phase: Phase) -> MigrateResult<usize> {
        log::debug!("Rewrite '{}': {phase}", self.plan.table);
        match phase {
            Phase::CreateShadow => self.create_shadow().map(|_| 0),
            Phase::CopyRows => self.copy_rows(),
            Phase::DropOriginal => self.drop_original().map(|_| 0),
            Phase::RenameShadow => self.rename_shadow().map(|_| 0),
        }
    }

    /// Create every declared index that is missing.
    pub fn ensure_indexes(&self) -> MigrateResult<()> {
        for index in &self.plan.indexes {
            self.conn.execute_batch(&index.create_sql(&self.plan.table))?;
        }
        Ok(())
    }

    fn phase_error(&self, phase: Phase, reason: impl Into<String>) -> MigrateError {
        MigrateError::PhaseOrder {
            table: self.plan.table.clone(),
            phase: phase.to_string(),
            reason: reason.into(),
        }
    }

    fn create_shadow(&self) -> MigrateResult<()> {
        let shadow = self.plan.shadow_name();
        if let Some(live) = table_shape(self.conn, &shadow)? {
            if live == self.plan.target_shape()? {
                log::debug!("Reusing shadow table '{shadow}' from an earlier attempt");
                return Ok(());
            }
            if !table_exists(self.conn, &self.plan.table)? {
                return Err(self.phase_error(
                    Phase::CreateShadow,
                    format!("stale shadow '{shadow}' holds the only copy of the rows"),
                ));
            }
            log::warn!(
                "Dropping stale shadow table '{shadow}' with columns {:?}",
                live.column_names()
            );
            self.conn
                .execute_batch(&format!("DROP TABLE {}", quote_ident(&shadow)))?;
        }
        self.conn.execute_batch(&self.plan.create_sql())?;
        Ok(())
    }

    fn copy_rows(&self) -> MigrateResult<usize> {
        let table = &self.plan.table;
        let shadow = self.plan.shadow_name();
        let projection = self.plan.projection();
        let legacy = probe(self.conn, table, &projection.source_columns())?;
        if !legacy.exists {
            log::debug!("No legacy '{table}' table; nothing to copy");
            return Ok(0);
        }
        if !table_exists(self.conn, &shadow)? {
            return Err(self.phase_error(Phase::CopyRows, "shadow table does not exist"));
        }

        // While the original exists it is authoritative; rows a reused shadow
        // kept from an earlier attempt may since have changed or been deleted
        let stale = self
            .conn
            .execute(&format!("DELETE FROM {}", quote_ident(&shadow)), [])?;
        if stale > 0 {
            log::debug!("Cleared {stale} rows left in '{shadow}' by an earlier attempt");
        }

        let fills = projection.fill_exprs(&legacy);
        let copied = if fills.is_empty() {
            0
        } else {
            let names: Vec<&str> = fills.iter().map(|(name, _)| *name).collect();
            let exprs: Vec<&str> = fills.iter().map(|(_, sql)| sql.as_str()).collect();
            // WHERE true disambiguates the upsert clause from a join
            let sql = format!(
                "INSERT INTO {} ({}) SELECT {} FROM {} WHERE true ON CONFLICT DO NOTHING",
                quote_ident(&shadow),
                quote_ident_list(&names),
                exprs.join(", "),
                quote_ident(table)
            );
            self.conn.execute(&sql, [])?
        };

        // Every source row must have produced its own shadow row
        let source_rows = count_rows(self.conn, table)?;
        let shadow_rows = copied as i64;
        if shadow_rows != source_rows {
            return Err(MigrateError::RowLoss {
                table: table.clone(),
                source_rows,
                shadow_rows,
            });
        }
        log::debug!("Copied {copied} of {source_rows} rows from '{table}' into '{shadow}'");
        Ok(copied)
    }

    fn drop_original(&self) -> MigrateResult<()> {
        let table = &self.plan.table;
        if !table_exists(self.conn, table)? {
            return Ok(());
        }
        if !table_exists(self.conn, &self.plan.shadow_name())? {
            return Err(self.phase_error(
                Phase::DropOriginal,
                "refusing to drop the table before its shadow exists",
            ));
        }
        self.conn
            .execute_batch(&format!("DROP TABLE {}", quote_ident(table)))?;
        Ok(())
    }

    fn rename_shadow(&self) -> MigrateResult<()> {
        let table = &self.plan.table;
        let shadow = self.plan.shadow_name();
        let table_present = table_exists(self.conn, table)?;
        if !table_exists(self.conn, &shadow)? {
            if table_present {
                return Ok(());
            }
            return Err(self.phase_error(
                Phase::RenameShadow,
                "neither the table nor its shadow exists",
            ));
        }
        if table_present {
            return Err(self.phase_error(
                Phase::RenameShadow,
                "the original table has not been dropped",
            ));
        }
        self.conn.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&shadow),
            quote_ident(table)
        ))?;
        Ok(())
    }
}

fn count_rows(conn: &Connection, table: &str) -> MigrateResult<i64> {
    let n = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

#[cfg(test)]
#[path = "rewrite_test.rs"]
mod tests;
