//! Tests for plan loading and ordering validation.

use super::*;
use std::fs;

fn sql_step(version: i64) -> Step {
    Step::new(
        version,
        format!("step_{version}"),
        vec![Action::Sql {
            sql: "SELECT 1".to_string(),
            when_tables_exist: Vec::new(),
        }],
    )
}

// ── Ordering ───────────────────────────────────────────────────────────

#[test]
fn ascending_versions_pass() {
    let steps: Vec<Step> = [1, 2, 5, 10].into_iter().map(sql_step).collect();
    validate_steps(&steps).unwrap();
}

#[test]
fn duplicate_version_is_out_of_order() {
    let steps: Vec<Step> = [1, 2, 3, 2].into_iter().map(sql_step).collect();
    match validate_steps(&steps).unwrap_err() {
        MigrateError::OutOfOrder { version, previous } => {
            assert_eq!(version, 2);
            assert_eq!(previous, 3);
        }
        other => panic!("expected OutOfOrder, got {other}"),
    }
}

#[test]
fn repeated_version_is_out_of_order() {
    let steps: Vec<Step> = [1, 1].into_iter().map(sql_step).collect();
    assert!(matches!(
        validate_steps(&steps),
        Err(MigrateError::OutOfOrder { .. })
    ));
}

// ── YAML plans ─────────────────────────────────────────────────────────

#[test]
fn yaml_plan_parses_and_validates() {
    let plan = MigrationPlan::from_yaml(
        r#"
steps:
  - version: 1
    name: create_matches
    actions:
      - kind: sql
        sql: CREATE TABLE IF NOT EXISTS matches (match_id INTEGER PRIMARY KEY)
  - version: 2
    name: add_score
    actions:
      - kind: add_column
        table: matches
        column: radiant_score
        definition: INTEGER
"#,
    )
    .unwrap();
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.into_steps()[1].name, "add_score");
}

#[test]
fn yaml_plan_with_bad_json_path_is_invalid() {
    let err = MigrationPlan::from_yaml(
        r#"
steps:
  - version: 1
    name: rw
    actions:
      - kind: rewrite
        table: players
        columns:
          - name: personaname
            definition: TEXT
            sources:
              - json: profile_data
                path: "profile..personaname"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, MigrateError::InvalidPlan(_)), "got {err}");
}

#[test]
fn yaml_plan_rejects_unknown_top_level_keys() {
    assert!(MigrationPlan::from_yaml("steps: []\nextra: 1\n").is_err());
}

#[test]
fn plan_file_errors_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.yml");
    fs::write(&path, "steps:\n  - version: 0\n    name: x\n    actions: []\n").unwrap();
    let err = MigrationPlan::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("plan.yml"));
}

// ── Directory plans ────────────────────────────────────────────────────

#[test]
fn directory_plan_orders_by_numeric_prefix() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("010_add_score.sql"),
        "ALTER TABLE matches ADD COLUMN radiant_score INTEGER;",
    )
    .unwrap();
    fs::write(
        dir.path().join("002_create_matches.sql"),
        "CREATE TABLE IF NOT EXISTS matches (match_id INTEGER PRIMARY KEY);",
    )
    .unwrap();
    fs::write(
        dir.path().join("011_dire.yml"),
        "actions:\n  - kind: add_column\n    table: matches\n    column: dire_score\n    definition: INTEGER\n",
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "not a step").unwrap();

    let plan = MigrationPlan::from_dir(dir.path()).unwrap();
    let ids: Vec<(i64, &str)> = plan
        .steps
        .iter()
        .map(|s| (s.version, s.name.as_str()))
        .collect();
    assert_eq!(
        ids,
        vec![(2, "create_matches"), (10, "add_score"), (11, "dire")]
    );
}

#[test]
fn directory_plan_yaml_may_rename_step() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("001_x.yaml"),
        "name: create_matches\nactions:\n  - kind: drop_table\n    table: legacy\n",
    )
    .unwrap();
    let plan = MigrationPlan::from_dir(dir.path()).unwrap();
    assert_eq!(plan.steps[0].name, "create_matches");
}

#[test]
fn directory_plan_rejects_malformed_prefix() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("v1_create.sql"), "SELECT 1;").unwrap();
    assert!(matches!(
        MigrationPlan::from_dir(dir.path()),
        Err(MigrateError::InvalidPlan(_))
    ));
}

#[test]
fn directory_plan_rejects_duplicate_ordinals() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
    fs::write(dir.path().join("01_b.sql"), "SELECT 2;").unwrap();
    assert!(matches!(
        MigrationPlan::from_dir(dir.path()),
        Err(MigrateError::OutOfOrder { .. })
    ));
}

// ── load_plan ──────────────────────────────────────────────────────────

#[test]
fn load_plan_defaults_to_builtin() {
    let plan = load_plan(None).unwrap();
    assert_eq!(plan.steps.first().map(|s| s.version), Some(1));
}

#[test]
fn load_plan_missing_path_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yml");
    assert!(matches!(
        load_plan(Some(&missing)),
        Err(MigrateError::InvalidPlan(_))
    ));
}

#[test]
fn load_plan_accepts_file_and_dir() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plan.yml");
    fs::write(
        &file,
        "steps:\n  - version: 7\n    name: only\n    actions:\n      - kind: drop_table\n        table: t\n",
    )
    .unwrap();
    assert_eq!(load_plan(Some(&file)).unwrap().steps[0].version, 7);

    let steps_dir = dir.path().join("steps");
    fs::create_dir(&steps_dir).unwrap();
    fs::write(steps_dir.join("003_c.sql"), "SELECT 1;").unwrap();
    assert_eq!(load_plan(Some(&steps_dir)).unwrap().steps[0].version, 3);
}
