use std::path::PathBuf;

use photosync_core::RecordId;

use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_add(context: &CliContext, paths: &[PathBuf]) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    for path in paths {
        match engine.enqueue(path).await? {
            Some(id) => println!("Queued {} as #{id}", path.display()),
            None => println!("Skipped {}: already recorded", path.display()),
        }
    }
    Ok(())
}

pub async fn run_retry(context: &CliContext, id: &str) -> Result<(), CliError> {
    let id: RecordId = id.parse()?;
    let engine = context.open_engine().await?;
    engine.requeue(id).await?;
    println!("Queued record #{id}");
    Ok(())
}

pub async fn run_auto_upload(context: &CliContext, enabled: bool) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    engine.set_auto_upload(enabled).await?;
    println!(
        "Auto-upload {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
