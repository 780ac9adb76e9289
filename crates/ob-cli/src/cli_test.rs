use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "observer-migrate",
        "run",
        "--dry-run",
        "-v",
        "--database",
        "cache.db",
        "--plan",
        "steps/",
    ])
    .unwrap();
    assert!(cli.global.verbose);
    assert_eq!(cli.global.database.as_deref(), Some("cache.db"));
    assert_eq!(cli.global.plan.as_deref(), Some("steps/"));
    match cli.command {
        Commands::Run(args) => assert!(args.dry_run),
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn status_json_flag() {
    let cli = Cli::try_parse_from(["observer-migrate", "status", "--json"]).unwrap();
    assert!(matches!(cli.command, Commands::Status(StatusArgs { json: true })));
}

#[test]
fn unit_subcommands_parse() {
    let cli = Cli::try_parse_from(["observer-migrate", "-c", "observer.yml", "validate"]).unwrap();
    assert_eq!(cli.global.config.as_deref(), Some("observer.yml"));
    assert!(matches!(cli.command, Commands::Validate));
    let cli = Cli::try_parse_from(["observer-migrate", "unlock"]).unwrap();
    assert!(matches!(cli.command, Commands::Unlock));
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["observer-migrate"]).is_err());
}
