//! Unlock command implementation

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::common::{load_config, with_runner, StoreAccess};

/// Execute the unlock command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let store = config.database.path.clone();

    let holder = with_runner(config, Vec::new(), StoreAccess::Existing, |runner, _| {
        Ok(runner.force_unlock()?)
    })
    .await?;
    match holder {
        Some(h) => println!(
            "Released migration lock on {store} held by {} since {}",
            h.owner, h.acquired_at
        ),
        None => println!("{store} is not locked"),
    }
    Ok(())
}
