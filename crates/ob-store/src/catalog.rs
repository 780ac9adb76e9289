//! Catalog introspection (existence probing).
//!
//! Every function here treats an absent table as a valid answer rather than
//! an error, so migration steps can branch on what legacy structure a store
//! actually has.

use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

/// Result of probing one table for a set of candidate columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProbe {
    /// Table that was probed
    pub table: String,
    /// Whether the table exists at all
    pub exists: bool,
    /// Candidate columns that exist, in candidate order
    pub present: Vec<String>,
    /// Candidate columns that do not exist, in candidate order
    pub missing: Vec<String>,
}

impl TableProbe {
    /// Whether `column` was among the present candidates.
    pub fn has_column(&self, column: &str) -> bool {
        self.present.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Check whether a table exists.
pub fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::with_context(e, format!("table lookup for '{table}'")))?;
    Ok(found.is_some())
}

/// Check whether an index exists.
pub fn index_exists(conn: &Connection, index: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1 COLLATE NOCASE",
            [index],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::with_context(e, format!("index lookup for '{index}'")))?;
    Ok(found.is_some())
}

/// Return a table's columns in declaration order.
///
/// An absent table yields an empty list.
pub fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(|e| StoreError::with_context(e, format!("column lookup for '{table}'")))?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .map_err(|e| StoreError::with_context(e, format!("column lookup for '{table}'")))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::with_context(e, format!("column row for '{table}'")))?;
    Ok(columns)
}

/// Determine which of `candidates` exist on `table`.
pub fn probe<S: AsRef<str>>(
    conn: &Connection,
    table: &str,
    candidates: &[S],
) -> StoreResult<TableProbe> {
    if !table_exists(conn, table)? {
        return Ok(TableProbe {
            table: table.to_string(),
            exists: false,
            present: Vec::new(),
            missing: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        });
    }

    let live: BTreeSet<String> = table_columns(conn, table)?
        .into_iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let (present, missing): (Vec<String>, Vec<String>) = candidates
        .iter()
        .map(|c| c.as_ref().to_string())
        .partition(|c| live.contains(&c.to_ascii_lowercase()));

    Ok(TableProbe {
        table: table.to_string(),
        exists: true,
        present,
        missing,
    })
}

/// One column as SQLite's catalog reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShape {
    /// Lowercased column name
    pub name: String,
    /// Uppercased declared type, empty when none was declared
    pub decl_type: String,
    pub not_null: bool,
    /// Default expression as written in the DDL
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it
    pub pk: i64,
}

/// One outgoing foreign key edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ForeignKeyShape {
    pub from: String,
    pub parent: String,
    pub to: Option<String>,
    pub on_update: String,
    pub on_delete: String,
}

/// Everything about a table's declaration that decides which rows it can
/// hold: columns with their types, nullability, defaults and key positions,
/// foreign keys, and `UNIQUE` constraints.
///
/// Two tables with equal shapes accept the same rows. `CHECK` constraints are
/// not compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    pub columns: Vec<ColumnShape>,
    /// Sorted
    pub foreign_keys: Vec<ForeignKeyShape>,
    /// Column lists of `UNIQUE` constraints, sorted
    pub unique: Vec<Vec<String>>,
}

impl TableShape {
    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Read the declared shape of `table`; `None` when it does not exist.
pub fn table_shape(conn: &Connection, table: &str) -> StoreResult<Option<TableShape>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let lookup_err = |e: rusqlite::Error| {
        StoreError::with_context(e, format!("shape lookup for '{table}'"))
    };

    let mut stmt = conn
        .prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?1) ORDER BY cid",
        )
        .map_err(lookup_err)?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnShape {
                name: row.get::<_, String>(0)?.to_ascii_lowercase(),
                decl_type: row.get::<_, String>(1)?.trim().to_ascii_uppercase(),
                not_null: row.get::<_, i64>(2)? != 0,
                default: row.get(3)?,
                pk: row.get(4)?,
            })
        })
        .map_err(lookup_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(lookup_err)?;

    let mut stmt = conn
        .prepare(
            "SELECT \"from\", \"table\", \"to\", on_update, on_delete \
             FROM pragma_foreign_key_list(?1)",
        )
        .map_err(lookup_err)?;
    let mut foreign_keys = stmt
        .query_map([table], |row| {
            Ok(ForeignKeyShape {
                from: row.get::<_, String>(0)?.to_ascii_lowercase(),
                parent: row.get::<_, String>(1)?.to_ascii_lowercase(),
                to: row
                    .get::<_, Option<String>>(2)?
                    .map(|c| c.to_ascii_lowercase()),
                on_update: row.get::<_, String>(3)?.to_ascii_uppercase(),
                on_delete: row.get::<_, String>(4)?.to_ascii_uppercase(),
            })
        })
        .map_err(lookup_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(lookup_err)?;
    foreign_keys.sort();

    let mut stmt = conn
        .prepare(
            "SELECT il.name, ii.name FROM pragma_index_list(?1) AS il \
             JOIN pragma_index_info(il.name) AS ii \
             WHERE il.origin = 'u' ORDER BY il.name, ii.seqno",
        )
        .map_err(lookup_err)?;
    let pairs = stmt
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(lookup_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(lookup_err)?;
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (index, column) in pairs {
        grouped
            .entry(index)
            .or_default()
            .push(column.to_ascii_lowercase());
    }
    let mut unique: Vec<Vec<String>> = grouped.into_values().collect();
    unique.sort();

    Ok(Some(TableShape {
        columns,
        foreign_keys,
        unique,
    }))
}

/// Point-in-time read of every user table and its columns.
///
/// Callers recompute this per step; the store can change between steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    tables: BTreeMap<String, Vec<String>>,
}

impl CatalogSnapshot {
    /// Read the live catalog.
    pub fn capture(conn: &Connection) -> StoreResult<Self> {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(|e| StoreError::with_context(e, "catalog read"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::with_context(e, "catalog read"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::with_context(e, "catalog row"))?;

        let mut tables = BTreeMap::new();
        for name in names {
            let columns = table_columns(conn, &name)?;
            tables.insert(name, columns);
        }
        Ok(Self { tables })
    }

    /// Whether the snapshot contains `table`.
    pub fn has_table(&self, table: &str) -> bool {
        self.columns(table).is_some()
    }

    /// Whether `table` exists and has `column`.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|cols| cols.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// Columns of `table` in declaration order.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, cols)| cols.as_slice())
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
