use std::path::PathBuf;
use std::sync::Arc;

use photosync_core::media::{DirectoryMediaSource, MediaSource};
use photosync_core::upload::{CycleOutcome, UploadEvent};
use photosync_core::Engine;
use serde::Serialize;
use tokio::sync::broadcast::error::TryRecvError;

use crate::commands::common::{describe_cycle, describe_event, CliContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct CycleSummary {
    pub already_running: bool,
    pub uploaded: usize,
    pub failed: usize,
    pub halted: Option<String>,
}

impl From<&CycleOutcome> for CycleSummary {
    fn from(outcome: &CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::AlreadyRunning => Self {
                already_running: true,
                uploaded: 0,
                failed: 0,
                halted: None,
            },
            CycleOutcome::Completed(report) => Self {
                already_running: false,
                uploaded: report.uploaded,
                failed: report.failed,
                halted: report.halted.as_ref().map(ToString::to_string),
            },
        }
    }
}

pub async fn run_upload(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let (_lock, engine) = context.open_engine_for_upload("upload").await?;
    let outcome = upload_with_progress(&engine, !as_json).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&CycleSummary::from(&outcome))?
        );
    } else {
        println!("{}", describe_cycle(&outcome));
    }
    Ok(())
}

/// Run one cycle, printing upload events as they arrive.
async fn upload_with_progress(engine: &Engine, print_events: bool) -> Result<CycleOutcome, CliError> {
    let mut events = engine.subscribe();
    let show = |event: &UploadEvent| {
        if print_events {
            println!("{}", describe_event(event));
        }
    };

    let cycle = engine.run_upload_cycle();
    tokio::pin!(cycle);
    let outcome = loop {
        tokio::select! {
            outcome = &mut cycle => break outcome?,
            received = events.recv() => {
                if let Ok(event) = received {
                    show(&event);
                }
            }
        }
    };

    loop {
        match events.try_recv() {
            Ok(event) => show(&event),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    Ok(outcome)
}

pub async fn run_watch(context: &CliContext, dir: Option<PathBuf>) -> Result<(), CliError> {
    let (_lock, engine) = context.open_engine_for_upload("watch").await?;
    let source =
        dir.map(|dir| Arc::new(DirectoryMediaSource::new(dir)) as Arc<dyn MediaSource>);

    let interval = engine.config().periodic_interval;
    println!(
        "Watching profile '{}' every {}s (Ctrl-C to stop)",
        context.profile_name,
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                println!("Stopping");
                return Ok(());
            }
            _ = ticker.tick() => run_pass(&engine, source.clone()).await,
        }
    }
}

/// One reconciliation plus upload pass; failures are logged and retried on
/// the next tick.
async fn run_pass(engine: &Engine, source: Option<Arc<dyn MediaSource>>) {
    match engine.run_reconciliation(source).await {
        Ok(summary) => {
            let inserted = summary.remote.map_or(0, |report| report.inserted)
                + summary.device.map_or(0, |report| report.inserted);
            tracing::info!("Reconciliation recorded {} new item(s)", inserted);
        }
        Err(error) => tracing::warn!("Reconciliation failed: {}", error),
    }

    match upload_with_progress(engine, true).await {
        Ok(outcome) => println!("{}", describe_cycle(&outcome)),
        Err(error) => tracing::warn!("Upload cycle failed: {}", error),
    }
}
