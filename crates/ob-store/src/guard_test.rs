//! Tests for foreign-key suspension and verification.

use super::*;
use crate::StoreDb;

fn linked_store() -> StoreDb {
    let db = StoreDb::open_memory().unwrap();
    db.conn()
        .execute_batch(
            "CREATE TABLE players (account_id INTEGER PRIMARY KEY);
             CREATE TABLE player_matches (
                 match_id   INTEGER NOT NULL,
                 account_id INTEGER NOT NULL REFERENCES players(account_id),
                 PRIMARY KEY (match_id, account_id)
             );
             INSERT INTO players VALUES (1);
             INSERT INTO player_matches VALUES (100, 1);",
        )
        .unwrap();
    db
}

#[test]
fn suspend_and_restore_round_trip() {
    let db = linked_store();
    let guard = ForeignKeyGuard::suspend(db.conn()).unwrap();
    assert!(guard.was_enabled());
    assert!(!db.foreign_keys_enabled().unwrap());

    // Dangling insert is accepted while suspended
    db.conn()
        .execute("INSERT INTO player_matches VALUES (101, 99)", [])
        .unwrap();

    guard.restore().unwrap();
    assert!(db.foreign_keys_enabled().unwrap());
}

#[test]
fn drop_restores_enforcement() {
    let db = linked_store();
    {
        let _guard = ForeignKeyGuard::suspend(db.conn()).unwrap();
        assert!(!db.foreign_keys_enabled().unwrap());
    }
    assert!(db.foreign_keys_enabled().unwrap());
}

#[test]
fn restore_keeps_enforcement_off_when_it_was_off() {
    let db = linked_store();
    db.conn().execute_batch("PRAGMA foreign_keys = OFF").unwrap();
    let guard = ForeignKeyGuard::suspend(db.conn()).unwrap();
    assert!(!guard.was_enabled());
    guard.restore().unwrap();
    assert!(!db.foreign_keys_enabled().unwrap());
}

#[test]
fn suspend_inside_open_unit_is_refused() {
    let db = linked_store();
    let result: Result<(), StoreError> = db.transaction(|conn| {
        ForeignKeyGuard::suspend(conn)?;
        Ok(())
    });
    assert!(matches!(result, Err(StoreError::TransactionError(_))));
    assert!(db.foreign_keys_enabled().unwrap());
}

#[test]
fn check_passes_on_consistent_data() {
    let db = linked_store();
    let guard = ForeignKeyGuard::suspend(db.conn()).unwrap();
    guard.check().unwrap();
}

#[test]
fn check_reports_dangling_rows() {
    let db = linked_store();
    let guard = ForeignKeyGuard::suspend(db.conn()).unwrap();
    db.conn()
        .execute("DELETE FROM players WHERE account_id = 1", [])
        .unwrap();

    match guard.check() {
        Err(StoreError::ForeignKeyViolation(violations)) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].table, "player_matches");
            assert_eq!(violations[0].parent, "players");
        }
        other => panic!("expected a violation, got {other:?}"),
    }
}

#[test]
fn violation_display_is_readable() {
    let v = ForeignKeyViolation {
        table: "player_matches".to_string(),
        rowid: Some(3),
        parent: "players".to_string(),
    };
    assert_eq!(v.to_string(), "player_matches[rowid 3] -> players");
    let err = StoreError::ForeignKeyViolation(vec![v]);
    assert!(err.to_string().contains("1 violation(s)"));
}

#[test]
fn enforcement_rejects_dangling_insert_after_restore() {
    let db = linked_store();
    ForeignKeyGuard::suspend(db.conn())
        .unwrap()
        .restore()
        .unwrap();
    assert!(db
        .conn()
        .execute("INSERT INTO player_matches VALUES (102, 42)", [])
        .is_err());
}
