use std::path::Path;
use std::sync::Arc;

use photosync_core::media::DirectoryMediaSource;
use photosync_core::reconcile::ReconcileReport;

use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_scan(context: &CliContext, dir: &Path, full: bool) -> Result<(), CliError> {
    if !dir.is_dir() {
        return Err(CliError::Config(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let engine = context.open_engine().await?;
    let source = Arc::new(DirectoryMediaSource::new(dir));
    let report = engine.scan_device(source, full).await?;
    println!("{}", describe_report("Device scan", &report));
    Ok(())
}

pub async fn run_pull(context: &CliContext) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let report = engine.pull_remote_inventory().await?;
    println!("{}", describe_report("Server inventory", &report));
    Ok(())
}

pub fn describe_report(label: &str, report: &ReconcileReport) -> String {
    let mut summary = format!(
        "{label}: {} new, {} already known",
        report.inserted, report.skipped_duplicates
    );
    if report.skipped_invalid > 0 {
        summary.push_str(&format!(", {} unreadable", report.skipped_invalid));
    }
    summary
}
