use photosync_core::SyncStatus;
use serde::Serialize;

use crate::commands::common::{
    format_record_lines, format_timestamp, record_to_list_item, CliContext, RecordListItem,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub profile: String,
    pub username: Option<String>,
    pub server_url: Option<String>,
    pub server_key_fingerprint: Option<String>,
    pub logged_in: bool,
    pub auto_upload: bool,
    pub last_sync_cursor: Option<i64>,
    pub counts: Vec<StatusCount>,
}

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
}

pub async fn run_status(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let engine = context.open_engine().await?;
    let settings = engine.settings().await?;
    let report = StatusReport {
        profile: context.profile_name.clone(),
        username: context.profile.username.clone(),
        server_url: context.server_url.clone(),
        server_key_fingerprint: engine.server_key_fingerprint()?,
        logged_in: engine.is_logged_in()?,
        auto_upload: settings.auto_upload,
        last_sync_cursor: settings.last_sync_cursor,
        counts: engine
            .status_summary()
            .await?
            .into_iter()
            .map(|(status, count)| StatusCount {
                status: status.to_string(),
                count,
            })
            .collect(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_status_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Profile:     {} ({})",
            report.profile,
            report.username.as_deref().unwrap_or("no user")
        ),
        format!(
            "Server:      {}",
            report.server_url.as_deref().unwrap_or("(not configured)")
        ),
        format!(
            "Server key:  {}",
            report
                .server_key_fingerprint
                .as_deref()
                .unwrap_or("(not exchanged)")
        ),
        format!(
            "Session:     {}",
            if report.logged_in { "logged in" } else { "logged out" }
        ),
        format!(
            "Auto-upload: {}",
            if report.auto_upload { "on" } else { "off" }
        ),
        format!(
            "Last sync:   {}",
            report
                .last_sync_cursor
                .map_or_else(|| "never".to_string(), format_timestamp)
        ),
    ];
    for count in &report.counts {
        lines.push(format!("{:<12} {}", format!("{}:", count.status), count.count));
    }
    lines
}

pub async fn run_list(
    context: &CliContext,
    status: Option<&str>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let status = status.map(str::parse::<SyncStatus>).transpose()?;
    let engine = context.open_engine().await?;
    let records = match status {
        Some(status) => {
            let mut records = engine.by_status(status).await?;
            records.truncate(limit);
            records
        }
        None => engine.list(limit, 0).await?,
    };

    if as_json {
        let items = records
            .iter()
            .map(record_to_list_item)
            .collect::<Vec<RecordListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_record_lines(&records) {
            println!("{line}");
        }
    }
    Ok(())
}
