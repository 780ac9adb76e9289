//! Validate command implementation
//!
//! Loads and checks the plan without opening the store.

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::common::{load_config, load_steps, print_table};

/// Execute the validate command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let steps = load_steps(&config)?;

    let source = match &config.migrations.plan {
        Some(path) => path.display().to_string(),
        None => "built-in plan".to_string(),
    };

    let mut rows = Vec::with_capacity(steps.len());
    for step in &steps {
        let checksum = step.checksum()?;
        rows.push(vec![
            format!("v{:03}", step.version),
            step.name.clone(),
            step.actions
                .iter()
                .map(|a| a.describe())
                .collect::<Vec<_>>()
                .join("; "),
            checksum[..12].to_string(),
        ]);
    }

    if global.verbose {
        print_table(&["VERSION", "NAME", "ACTIONS", "CHECKSUM"], &rows);
        println!();
    }
    println!("{source}: {} step(s) valid", steps.len());
    Ok(())
}
