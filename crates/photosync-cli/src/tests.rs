use std::time::Duration;

use clap::{CommandFactory, Parser};
use photosync_core::error::NetworkError;
use photosync_core::models::NewSyncRecord;
use photosync_core::reconcile::ReconcileReport;
use photosync_core::upload::{CycleOutcome, CycleReport, FailureReason, UploadEvent};
use photosync_core::{Error, RecordId, SyncRecord, SyncStatus};

use crate::cli::{Cli, Commands, Toggle};
use crate::commands::common::{
    describe_cycle, describe_event, format_record_lines, normalize_password, record_to_list_item,
    resolve_server_url, CliContext,
};
use crate::commands::queue::{run_auto_upload, run_retry};
use crate::commands::scan::describe_report;
use crate::commands::status::{format_status_lines, StatusCount, StatusReport};
use crate::commands::upload::{run_upload, CycleSummary};
use crate::config_profiles::CliProfile;
use crate::error::CliError;
use crate::lock::DataDirLock;

fn record(id: i64, status: SyncStatus, local_path: &str, remote_ref: Option<&str>) -> SyncRecord {
    SyncRecord {
        id: RecordId::new(id),
        local_path: local_path.to_string(),
        remote_ref: remote_ref.map(str::to_string),
        status,
        size_bytes: 2048,
        resolution: "640x480".to_string(),
        source_id: None,
        source_modified_time: 1_700_000_000_000,
        file_name: "beach.jpg".to_string(),
        created_at: 1_700_000_000_000,
    }
}

fn local_context(dir: &tempfile::TempDir, profile_name: &str) -> CliContext {
    CliContext {
        profile_name: profile_name.to_string(),
        profile: CliProfile::default(),
        data_dir: dir.path().to_path_buf(),
        server_url: None,
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn global_options_are_accepted_after_the_subcommand() {
    let cli = Cli::try_parse_from([
        "photosync",
        "list",
        "--status",
        "failed",
        "--limit",
        "5",
        "--server",
        "https://photos.example.com",
        "--profile",
        "home",
    ])
    .unwrap();

    assert_eq!(cli.server.as_deref(), Some("https://photos.example.com"));
    assert_eq!(cli.profile.as_deref(), Some("home"));
    match cli.command {
        Commands::List {
            status,
            limit,
            json,
        } => {
            assert_eq!(status.as_deref(), Some("failed"));
            assert_eq!(limit, 5);
            assert!(!json);
        }
        _ => panic!("expected list command"),
    }
}

#[test]
fn add_requires_at_least_one_path() {
    assert!(Cli::try_parse_from(["photosync", "add"]).is_err());
    assert!(Cli::try_parse_from(["photosync", "add", "a.jpg", "b.png"]).is_ok());
}

#[test]
fn auto_upload_parses_on_and_off() {
    let cli = Cli::try_parse_from(["photosync", "auto-upload", "on"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::AutoUpload { state: Toggle::On }
    ));
    assert!(Toggle::On.enabled());
    assert!(!Toggle::Off.enabled());
    assert!(Cli::try_parse_from(["photosync", "auto-upload", "maybe"]).is_err());
}

#[test]
fn resolve_server_url_prefers_flag_then_environment_then_profile() {
    assert_eq!(
        resolve_server_url(
            Some("https://flag.example.com".to_string()),
            Some("https://env.example.com".to_string()),
            Some("https://profile.example.com".to_string()),
        )
        .as_deref(),
        Some("https://flag.example.com")
    );
    assert_eq!(
        resolve_server_url(
            Some("  ".to_string()),
            Some("https://env.example.com".to_string()),
            Some("https://profile.example.com".to_string()),
        )
        .as_deref(),
        Some("https://env.example.com")
    );
    assert_eq!(
        resolve_server_url(None, None, Some("https://profile.example.com".to_string()))
            .as_deref(),
        Some("https://profile.example.com")
    );
    assert_eq!(resolve_server_url(None, None, None), None);
}

#[test]
fn normalize_password_keeps_inner_spaces() {
    assert_eq!(
        normalize_password(Some(" two words \n".to_string())),
        Some(" two words ".to_string())
    );
    assert_eq!(normalize_password(Some("\r\n".to_string())), None);
    assert_eq!(normalize_password(None), None);
}

#[test]
fn record_lines_prefer_remote_ref_over_local_path() {
    let records = vec![
        record(1, SyncStatus::Uploaded, "/photos/beach.jpg", Some("uploads/beach.jpg")),
        record(2, SyncStatus::Pending, "/photos/beach.jpg", None),
    ];
    let lines = format_record_lines(&records);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("UPLOADED"));
    assert!(lines[0].contains("(uploads/beach.jpg)"));
    assert!(lines[1].contains("PENDING"));
    assert!(lines[1].contains("(/photos/beach.jpg)"));

    assert_eq!(format_record_lines(&[]), vec!["No records.".to_string()]);
}

#[test]
fn list_items_drop_empty_local_paths() {
    let remote_only = record(7, SyncStatus::Uploaded, "", Some("uploads/beach.jpg"));
    let item = record_to_list_item(&remote_only);
    assert_eq!(item.id, 7);
    assert_eq!(item.status, "UPLOADED");
    assert_eq!(item.local_path, None);
    assert_eq!(item.created_at_iso, "2023-11-14T22:13:20+00:00");
}

#[test]
fn events_and_cycles_render_readable_lines() {
    let failed = UploadEvent::Failed {
        id: RecordId::new(3),
        file_name: "cat.png".to_string(),
        reason: FailureReason::FileNotFound,
    };
    assert_eq!(describe_event(&failed), "Failed cat.png: File not found");
    assert_eq!(
        describe_event(&UploadEvent::BackingOff {
            delay: Duration::from_secs(5)
        }),
        "Waiting 5s before the next upload"
    );

    let halted = CycleOutcome::Completed(CycleReport {
        uploaded: 2,
        failed: 1,
        halted: Some(FailureReason::MissingToken),
    });
    assert_eq!(
        describe_cycle(&halted),
        "Upload cycle finished: 2 uploaded, 1 failed (stopped: Authentication error)"
    );

    let summary = CycleSummary::from(&halted);
    assert!(!summary.already_running);
    assert_eq!(summary.halted.as_deref(), Some("Authentication error"));
    assert!(CycleSummary::from(&CycleOutcome::AlreadyRunning).already_running);
}

#[test]
fn reconcile_report_mentions_unreadable_files_only_when_present() {
    let mut report = ReconcileReport {
        inserted: 3,
        skipped_duplicates: 1,
        ..ReconcileReport::default()
    };
    assert_eq!(
        describe_report("Device scan", &report),
        "Device scan: 3 new, 1 already known"
    );

    report.skipped_invalid = 2;
    assert_eq!(
        describe_report("Device scan", &report),
        "Device scan: 3 new, 1 already known, 2 unreadable"
    );
}

#[test]
fn status_lines_show_placeholders_for_missing_state() {
    let report = StatusReport {
        profile: "default".to_string(),
        username: Some("alice".to_string()),
        server_url: None,
        server_key_fingerprint: None,
        logged_in: false,
        auto_upload: true,
        last_sync_cursor: None,
        counts: vec![StatusCount {
            status: "PENDING".to_string(),
            count: 4,
        }],
    };
    let lines = format_status_lines(&report);
    assert!(lines.contains(&"Profile:     default (alice)".to_string()));
    assert!(lines.contains(&"Server:      (not configured)".to_string()));
    assert!(lines.contains(&"Session:     logged out".to_string()));
    assert!(lines.contains(&"Auto-upload: on".to_string()));
    assert!(lines.contains(&"Last sync:   never".to_string()));
    assert!(lines.contains(&"PENDING:     4".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn local_commands_work_without_a_server() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir, "cli-test-local");

    run_auto_upload(&context, true).await.unwrap();
    let engine = context.open_engine().await.unwrap();
    assert!(engine.settings().await.unwrap().auto_upload);
    assert!(dir.path().join("photosync.db").exists());
    assert!(dir.path().join("keys").is_dir());

    let error = run_retry(&context, "42").await.unwrap_err();
    assert!(matches!(error, CliError::Core(Error::NotFound(_))));

    let error = run_retry(&context, "not-a-number").await.unwrap_err();
    assert!(matches!(error, CliError::Core(Error::InvalidInput(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_without_a_server_reports_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir, "cli-test-upload");

    let error = run_upload(&context, true).await.unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(Error::Network(NetworkError::InvalidConfiguration(_)))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn only_locked_upload_commands_reset_in_flight_records() {
    let dir = tempfile::tempdir().unwrap();
    let context = local_context(&dir, "cli-test-recovery");

    let uploader = context.open_engine().await.unwrap();
    let record = NewSyncRecord::local("/p/a.jpg", SyncStatus::Pending, 1, "1x1", None, 1).unwrap();
    let id = uploader.store().insert(&record).await.unwrap();
    uploader.store().claim_next(None).await.unwrap().unwrap();
    let status_of = |engine: &photosync_core::Engine| {
        let store = engine.store().clone();
        async move { store.by_id(id).await.unwrap().unwrap().status }
    };

    let status_command = context.open_engine().await.unwrap();
    assert_eq!(status_of(&status_command).await, SyncStatus::Uploading);
    assert_eq!(status_command.store().claim_next(None).await.unwrap(), None);

    let held = DataDirLock::acquire(&context.data_dir, "watch").unwrap();
    let error = run_upload(&context, true).await.unwrap_err();
    assert!(matches!(error, CliError::Locked(_)));
    assert_eq!(status_of(&uploader).await, SyncStatus::Uploading);

    drop(held);
    let (_lock, recovered) = context.open_engine_for_upload("upload").await.unwrap();
    assert_eq!(status_of(&recovered).await, SyncStatus::Pending);
}
