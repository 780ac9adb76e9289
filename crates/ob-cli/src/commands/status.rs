//! Status command implementation

use anyhow::{Context, Result};
use ob_migrate::{LockHolder, StepState, StepStatus};
use serde::Serialize;

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::{load_config, load_steps, print_table, with_runner, StoreAccess};

#[derive(Serialize)]
struct StatusReport {
    store: String,
    steps: Vec<StepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock: Option<LockHolder>,
}

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let steps = load_steps(&config)?;
    let store = config.database.path.clone();

    let (rows, lock) = with_runner(config, steps, StoreAccess::Existing, |runner, steps| {
        Ok((runner.status(steps)?, runner.lock_holder()?))
    })
    .await?;

    if args.json {
        let report = StatusReport {
            store,
            steps: rows,
            lock,
        };
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{json}");
        return Ok(());
    }

    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            vec![
                format!("v{:03}", row.version),
                row.name.clone(),
                match row.state {
                    StepState::Applied => "applied".to_string(),
                    StepState::Pending => "pending".to_string(),
                },
                row.applied_at.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["VERSION", "NAME", "STATE", "APPLIED_AT"], &table);

    let pending = rows
        .iter()
        .filter(|r| r.state == StepState::Pending)
        .count();
    println!();
    println!("{store}: {} applied, {pending} pending", rows.len() - pending);
    if let Some(holder) = lock {
        println!(
            "Locked by {} since {} (run `observer-migrate unlock` if that runner is gone)",
            holder.owner, holder.acquired_at
        );
    }
    Ok(())
}
