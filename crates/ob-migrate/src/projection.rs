//! Legacy row projection: how each target column is filled from an old row.
//!
//! Every target column carries an ordered fallback chain. When copying rows
//! forward, sources that name columns missing from the live legacy table are
//! dropped, and the remaining ones are folded into a `COALESCE` so the first
//! non-null candidate wins.

use ob_core::sql_utils::{quote_ident, quote_literal};
use ob_store::{json_scalar_sql, JsonPath, TableProbe};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plain column source: `{ column: profile_name }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnRef {
    pub column: String,
}

/// Semi-structured source: `{ json: profile_data, path: profile.personaname }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonRef {
    pub json: String,
    pub path: JsonPath,
}

/// Constant source: `{ literal: Unknown }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiteralValue {
    pub literal: serde_json::Value,
}

/// One candidate in a target column's fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSource {
    Json(JsonRef),
    Column(ColumnRef),
    Literal(LiteralValue),
}

impl ColumnSource {
    /// Take the value of a legacy column.
    pub fn column(name: impl Into<String>) -> Self {
        ColumnSource::Column(ColumnRef {
            column: name.into(),
        })
    }

    /// Extract a path from a legacy JSON text column.
    pub fn json(column: impl Into<String>, path: JsonPath) -> Self {
        ColumnSource::Json(JsonRef {
            json: column.into(),
            path,
        })
    }

    /// Use a constant.
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        ColumnSource::Literal(LiteralValue {
            literal: value.into(),
        })
    }

    /// Legacy column this source reads, if any.
    pub fn source_column(&self) -> Option<&str> {
        match self {
            ColumnSource::Column(c) => Some(&c.column),
            ColumnSource::Json(j) => Some(&j.json),
            ColumnSource::Literal(_) => None,
        }
    }

    /// Whether this source can be evaluated against a table with `probe`.
    pub fn is_available(&self, probe: &TableProbe) -> bool {
        self.source_column()
            .map_or(true, |c| probe.has_column(c))
    }

    /// SQL expression evaluating this source against a legacy row.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnSource::Column(c) => quote_ident(&c.column),
            ColumnSource::Json(j) => json_scalar_sql(&j.json, &j.path),
            ColumnSource::Literal(l) => literal_sql(&l.literal),
        }
    }
}

impl fmt::Display for ColumnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSource::Column(c) => write!(f, "column {}", c.column),
            ColumnSource::Json(j) => write!(f, "{}->{}", j.json, j.path),
            ColumnSource::Literal(l) => write!(f, "literal {}", l.literal),
        }
    }
}

/// Render a JSON value as an SQL literal.
///
/// Arrays and objects become JSON text, matching how the cache stores them.
pub fn literal_sql(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}

/// A column of the new table shape plus how to fill it from legacy rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetColumn {
    /// Column name in the new shape
    pub name: String,
    /// Type and column constraints, e.g. `TEXT NOT NULL DEFAULT 'Unknown'`
    pub definition: String,
    /// Fallback chain, first non-null wins
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<ColumnSource>,
}

impl TargetColumn {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
            sources: Vec::new(),
        }
    }

    /// Append a source to the fallback chain.
    pub fn from_source(mut self, source: ColumnSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Fill expression against a legacy table, or `None` when no source in
    /// the chain is available (the column's DEFAULT then applies).
    pub fn fill_sql(&self, probe: &TableProbe) -> Option<String> {
        let exprs: Vec<String> = self
            .sources
            .iter()
            .filter(|s| s.is_available(probe))
            .map(ColumnSource::to_sql)
            .collect();
        match exprs.len() {
            0 => None,
            1 => exprs.into_iter().next(),
            _ => Some(format!("COALESCE({})", exprs.join(", "))),
        }
    }
}

/// Read-only view over a rewrite's target columns.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
    columns: &'a [TargetColumn],
}

impl<'a> Projection<'a> {
    pub fn new(columns: &'a [TargetColumn]) -> Self {
        Self { columns }
    }

    /// Distinct legacy columns referenced anywhere in the chains.
    pub fn source_columns(&self) -> Vec<&'a str> {
        let mut seen: Vec<&str> = Vec::new();
        for column in self.columns {
            for source in &column.sources {
                if let Some(name) = source.source_column() {
                    if !seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                        seen.push(name);
                    }
                }
            }
        }
        seen
    }

    /// Target column names paired with their fill expressions.
    ///
    /// Columns without an available source are left out entirely so that the
    /// shadow table's DEFAULT applies.
    pub fn fill_exprs(&self, probe: &TableProbe) -> Vec<(&'a str, String)> {
        self.columns
            .iter()
            .filter_map(|c| c.fill_sql(probe).map(|sql| (c.name.as_str(), sql)))
            .collect()
    }
}

#[cfg(test)]
#[path = "projection_test.rs"]
mod tests;
