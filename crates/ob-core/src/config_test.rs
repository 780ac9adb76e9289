use super::*;

#[test]
fn test_parse_minimal_config() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.database.path, "matches.db");
    assert_eq!(config.database.busy_timeout_ms, 5_000);
    assert!(config.migrations.plan.is_none());
    assert_eq!(config.migrations.lock_stale_after_secs, Some(900));
    assert!(config.migrations.step_timeout_secs.is_none());
    assert!(config.migrations.verify_checksums);
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
database:
  path: /var/lib/observer/matches.db
  busy_timeout_ms: 250
migrations:
  plan: /etc/observer/plan.yml
  lock_stale_after_secs: null
  step_timeout_secs: 30
  verify_checksums: false
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.database.path, "/var/lib/observer/matches.db");
    assert_eq!(config.database.busy_timeout(), Duration::from_millis(250));
    assert_eq!(
        config.migrations.plan.as_deref(),
        Some(Path::new("/etc/observer/plan.yml"))
    );
    assert!(config.migrations.lock_stale_after().is_none());
    assert_eq!(
        config.migrations.step_timeout(),
        Some(Duration::from_secs(30))
    );
    assert!(!config.migrations.verify_checksums);
}

#[test]
fn test_unknown_fields_rejected() {
    let result: Result<Config, _> = serde_yaml::from_str("database:\n  pth: x.db\n");
    assert!(result.is_err());
}

#[test]
fn test_validate_empty_path() {
    let mut config = Config::default();
    config.database.path = "  ".to_string();
    assert!(matches!(
        config.validate(),
        Err(CoreError::ConfigInvalid { .. })
    ));
}

#[test]
fn test_validate_zero_timeout() {
    let mut config = Config::default();
    config.migrations.step_timeout_secs = Some(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_is_in_memory() {
    let mut config = Config::default();
    assert!(!config.database.is_in_memory());
    config.database.path = ":memory:".to_string();
    assert!(config.database.is_in_memory());
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("observer.yml")).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn test_load_from_dir_resolves_relative_plan() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("observer.yaml"),
        "database:\n  path: cache.db\nmigrations:\n  plan: migrations\n",
    )
    .unwrap();

    let config = Config::load_from_dir(dir.path()).unwrap();
    assert_eq!(config.database.path, "cache.db");
    assert_eq!(
        config.migrations.plan,
        Some(dir.path().join("migrations"))
    );
}

#[test]
fn test_load_from_dir_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Config::load_from_dir(dir.path()),
        Err(CoreError::ConfigNotFound { .. })
    ));
}
