//! Run command implementation

use anyhow::Result;
use ob_migrate::MigrateError;

use crate::cli::{GlobalArgs, RunArgs};
use crate::commands::common::{load_config, load_steps, with_runner, ExitCode, StoreAccess};

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let steps = load_steps(&config)?;
    let store = config.database.path.clone();

    if args.dry_run {
        let pending: Vec<(i64, String)> =
            with_runner(config, steps, StoreAccess::Existing, |runner, steps| {
                Ok(runner
                    .pending(steps)?
                    .into_iter()
                    .map(|s| (s.version, s.name.clone()))
                    .collect())
            })
            .await?;

        if pending.is_empty() {
            println!("{store} is up to date");
        } else {
            println!("Dry run - would apply {} migration(s) to {store}:", pending.len());
            for (version, name) in &pending {
                println!("  v{version:03} {name}");
            }
        }
        return Ok(());
    }

    let result = with_runner(config, steps, StoreAccess::Create, |runner, steps| {
        Ok(runner.run(steps))
    })
    .await?;
    match result {
        Ok(report) if report.applied.is_empty() => {
            println!(
                "{store} is up to date ({} migration(s) applied)",
                report.already_applied
            );
            Ok(())
        }
        Ok(report) => {
            println!("Applied {} migration(s) to {store}:", report.applied.len());
            for applied in &report.applied {
                println!("  \u{2713} v{:03} {}", applied.version, applied.name);
            }
            Ok(())
        }
        Err(err) => {
            if let MigrateError::StepFailed { applied, .. }
            | MigrateError::EnforcementNotRestored { applied, .. } = &err
            {
                for version in applied {
                    println!("  \u{2713} v{version:03}");
                }
            }
            eprintln!("Error: {:#}", anyhow::Error::from(err));
            Err(ExitCode(1).into())
        }
    }
}
