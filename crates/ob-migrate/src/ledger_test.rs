//! Tests for the applied-steps ledger.

use super::*;
use crate::error::MigrateError;
use crate::step::Action;
use ob_store::{StoreDb, StoreOptions};
use std::time::Duration;

fn step(version: i64) -> Step {
    Step::new(
        version,
        format!("step_{version}"),
        vec![Action::DropTable {
            table: "scratch".to_string(),
        }],
    )
}

#[test]
fn load_without_table_is_empty_and_read_only() {
    let db = StoreDb::open_memory().unwrap();
    assert!(load(db.conn()).unwrap().is_empty());
    assert!(!table_exists(db.conn(), LEDGER_TABLE).unwrap());
}

#[test]
fn record_then_load_in_version_order() {
    let db = StoreDb::open_memory().unwrap();
    ensure_table(db.conn()).unwrap();
    record(db.conn(), &step(2), "bbb").unwrap();
    let first = record(db.conn(), &step(1), "aaa").unwrap();

    let rows = load(db.conn()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], first);
    assert_eq!(rows[1].version, 2);
    assert_eq!(rows[1].name, "step_2");
    assert_eq!(rows[1].checksum, "bbb");
    assert!(chrono::DateTime::parse_from_rfc3339(&rows[0].applied_at).is_ok());
}

#[test]
fn version_is_recorded_at_most_once() {
    let db = StoreDb::open_memory().unwrap();
    ensure_table(db.conn()).unwrap();
    record(db.conn(), &step(1), "aaa").unwrap();
    let err = record(db.conn(), &step(1), "aaa").unwrap_err();
    assert!(
        matches!(err, MigrateError::Store(StoreError::ExecutionError(_))),
        "got {err}"
    );
    assert!(err.to_string().contains("v001"));
    assert_eq!(load(db.conn()).unwrap().len(), 1);
}

#[test]
fn record_rolls_back_with_its_unit() {
    let db = StoreDb::open_memory().unwrap();
    ensure_table(db.conn()).unwrap();
    let result: MigrateResult<()> = db.transaction(|conn| {
        record(conn, &step(1), "aaa")?;
        Err(MigrateError::InvalidPlan("boom".to_string()))
    });
    assert!(result.is_err());
    assert!(load(db.conn()).unwrap().is_empty());
}

#[test]
fn ensure_table_is_idempotent() {
    let db = StoreDb::open_memory().unwrap();
    ensure_table(db.conn()).unwrap();
    ensure_table(db.conn()).unwrap();
    assert!(table_exists(db.conn(), LEDGER_TABLE).unwrap());
}

#[test]
fn busy_store_keeps_its_classification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let options = StoreOptions {
        busy_timeout: Duration::from_millis(50),
        ..StoreOptions::default()
    };
    let db = StoreDb::open(&path, &options).unwrap();
    let writer = StoreDb::open(&path, &options).unwrap();
    writer.conn().execute_batch("BEGIN IMMEDIATE").unwrap();

    let err = ensure_table(db.conn()).unwrap_err();
    assert!(
        matches!(err, MigrateError::Store(StoreError::Busy(_))),
        "got {err}"
    );

    writer.conn().execute_batch("ROLLBACK").unwrap();
    ensure_table(db.conn()).unwrap();
}

#[test]
fn interrupted_record_keeps_its_classification() {
    let db = StoreDb::open_memory().unwrap();
    ensure_table(db.conn()).unwrap();
    db.conn().progress_handler(1, Some(|| true));

    let err = record(db.conn(), &step(1), "aaa").unwrap_err();
    db.conn().progress_handler(0, None::<fn() -> bool>);
    assert!(
        matches!(err, MigrateError::Store(StoreError::Interrupted(_))),
        "got {err}"
    );
    assert!(load(db.conn()).unwrap().is_empty());
}
