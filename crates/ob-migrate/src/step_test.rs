//! Tests for step actions, validation and checksums.

use super::*;
use crate::projection::{ColumnSource, TargetColumn};
use ob_store::catalog::{index_exists, table_columns};
use ob_store::StoreDb;

fn matches_store() -> StoreDb {
    let db = StoreDb::open_memory().unwrap();
    db.conn()
        .execute_batch("CREATE TABLE matches (match_id INTEGER PRIMARY KEY, radiant_score INTEGER)")
        .unwrap();
    db
}

fn add_dire_score() -> Action {
    Action::AddColumn {
        table: "matches".to_string(),
        column: "dire_score".to_string(),
        definition: "INTEGER".to_string(),
    }
}

// ── Actions ────────────────────────────────────────────────────────────

#[test]
fn add_column_is_existence_checked() {
    let db = matches_store();
    assert_eq!(add_dire_score().apply(db.conn()).unwrap(), ActionOutcome::Executed);
    assert!(matches!(
        add_dire_score().apply(db.conn()).unwrap(),
        ActionOutcome::Skipped(_)
    ));
    assert_eq!(
        table_columns(db.conn(), "matches").unwrap(),
        vec!["match_id", "radiant_score", "dire_score"]
    );
}

#[test]
fn add_column_to_missing_table_is_skipped() {
    let db = StoreDb::open_memory().unwrap();
    let outcome = add_dire_score().apply(db.conn()).unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::Skipped("table 'matches' is absent".to_string())
    );
}

#[test]
fn sql_waits_for_required_tables() {
    let db = matches_store();
    let action = Action::Sql {
        sql: "UPDATE player_matches SET hero_id = 0".to_string(),
        when_tables_exist: vec!["player_matches".to_string()],
    };
    assert!(matches!(action.apply(db.conn()).unwrap(), ActionOutcome::Skipped(_)));
}

#[test]
fn drop_table_is_existence_checked() {
    let db = matches_store();
    let action = Action::DropTable {
        table: "matches".to_string(),
    };
    assert_eq!(action.apply(db.conn()).unwrap(), ActionOutcome::Executed);
    assert!(matches!(action.apply(db.conn()).unwrap(), ActionOutcome::Skipped(_)));
}

#[test]
fn create_index_is_idempotent() {
    let db = matches_store();
    let action = Action::CreateIndex {
        name: "idx_matches_score".to_string(),
        table: "matches".to_string(),
        columns: vec!["radiant_score".to_string()],
        unique: false,
    };
    action.apply(db.conn()).unwrap();
    action.apply(db.conn()).unwrap();
    assert!(index_exists(db.conn(), "idx_matches_score").unwrap());
}

#[test]
fn step_apply_reports_each_action() {
    let db = matches_store();
    let step = Step::new(
        4,
        "add_match_dire_score",
        vec![
            add_dire_score(),
            Action::Sql {
                sql: "UPDATE matches SET dire_score = 0 WHERE dire_score IS NULL".to_string(),
                when_tables_exist: Vec::new(),
            },
        ],
    );
    let outcomes = step.apply(db.conn()).unwrap();
    assert_eq!(outcomes, vec![ActionOutcome::Executed, ActionOutcome::Executed]);
}

// ── Validation ─────────────────────────────────────────────────────────

#[test]
fn validate_rejects_empty_and_nonpositive() {
    assert!(Step::new(1, "ok", vec![add_dire_score()]).validate().is_ok());
    assert!(Step::new(0, "zero", vec![add_dire_score()]).validate().is_err());
    assert!(Step::new(1, " ", vec![add_dire_score()]).validate().is_err());
    assert!(Step::new(1, "empty", Vec::new()).validate().is_err());

    let err = Step::new(
        2,
        "blank_sql",
        vec![Action::Sql {
            sql: "  ".to_string(),
            when_tables_exist: Vec::new(),
        }],
    )
    .validate()
    .unwrap_err();
    assert!(err.to_string().contains("v002 blank_sql: action 1: sql is empty"));
}

#[test]
fn foreign_key_suspension_defaults_to_rewrites() {
    let rewrite = Action::Rewrite(RewritePlan {
        table: "players".to_string(),
        columns: vec![TargetColumn::new("account_id", "INTEGER PRIMARY KEY")
            .from_source(ColumnSource::column("account_id"))],
        constraints: Vec::new(),
        indexes: Vec::new(),
    });
    assert!(Step::new(3, "rw", vec![rewrite]).needs_foreign_key_suspension());
    assert!(!Step::new(4, "add", vec![add_dire_score()]).needs_foreign_key_suspension());

    let mut forced = Step::new(5, "forced", vec![add_dire_score()]);
    forced.suspend_foreign_keys = Some(true);
    assert!(forced.needs_foreign_key_suspension());
}

// ── Serialization ──────────────────────────────────────────────────────

#[test]
fn steps_deserialize_from_yaml() {
    let yaml = r#"
version: 3
name: simplify_players
actions:
  - kind: rewrite
    table: players
    columns:
      - name: account_id
        definition: INTEGER PRIMARY KEY
        sources: [{ column: account_id }]
    indexes:
      - { name: idx_players_account, columns: [account_id] }
  - kind: add_column
    table: players
    column: region
    definition: TEXT
"#;
    let step: Step = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(step.version, 3);
    assert_eq!(step.actions.len(), 2);
    match &step.actions[0] {
        Action::Rewrite(plan) => {
            assert_eq!(plan.table, "players");
            assert_eq!(plan.indexes[0].name, "idx_players_account");
            assert!(!plan.indexes[0].unique);
        }
        other => panic!("expected rewrite, got {other:?}"),
    }
}

#[test]
fn unknown_action_fields_are_rejected() {
    let yaml = "version: 1\nname: x\nactions:\n  - kind: drop_table\n    table: t\n    cascade: true\n";
    assert!(serde_yaml::from_str::<Step>(yaml).is_err());
    let yaml = "version: 1\nname: x\nactions:\n  - kind: truncate\n    table: t\n";
    assert!(serde_yaml::from_str::<Step>(yaml).is_err());
}

#[test]
fn checksum_is_stable_and_content_sensitive() {
    let a = Step::new(4, "add_match_dire_score", vec![add_dire_score()]);
    let b = a.clone();
    assert_eq!(a.checksum().unwrap(), b.checksum().unwrap());
    assert_eq!(a.checksum().unwrap().len(), 64);

    let mut edited = a.clone();
    edited.actions = vec![Action::AddColumn {
        table: "matches".to_string(),
        column: "dire_score".to_string(),
        definition: "INTEGER NOT NULL DEFAULT 0".to_string(),
    }];
    assert_ne!(a.checksum().unwrap(), edited.checksum().unwrap());
}

#[test]
fn describe_uses_first_sql_line() {
    let action = Action::Sql {
        sql: "\n  CREATE TABLE IF NOT EXISTS matches (\n match_id INTEGER\n)".to_string(),
        when_tables_exist: Vec::new(),
    };
    assert_eq!(action.describe(), "sql `CREATE TABLE IF NOT EXISTS matches (`");
    assert_eq!(add_dire_score().describe(), "add column matches.dire_score");
}
