use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use photosync_core::keystore::FileKeyStore;
use photosync_core::services::SyncStore;
use photosync_core::upload::{CycleOutcome, UploadEvent};
use photosync_core::util::normalize_text_option;
use photosync_core::{Engine, EngineConfig, SyncRecord};
use serde::Serialize;

use crate::auth::KeyringSessionStore;
use crate::config_profiles::{default_data_dir, CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::lock::DataDirLock;

const DATABASE_FILE_NAME: &str = "photosync.db";
const KEYS_DIR_NAME: &str = "keys";

/// Everything a command needs to open the engine for one profile.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub profile_name: String,
    pub profile: CliProfile,
    pub data_dir: PathBuf,
    pub server_url: Option<String>,
}

impl CliContext {
    pub fn resolve(
        explicit_profile: Option<&str>,
        explicit_data_dir: Option<PathBuf>,
        explicit_server: Option<String>,
    ) -> Result<Self, CliError> {
        let config = CliProfilesConfig::load()?;
        let profile_name = config.resolve_profile_name(explicit_profile);
        let profile = config.profile(&profile_name).cloned().unwrap_or_default();
        let data_dir = match explicit_data_dir {
            Some(dir) => dir,
            None => default_data_dir(&profile_name)?,
        };
        let server_url = resolve_server_url(
            explicit_server,
            env::var("PHOTOSYNC_SERVER_URL").ok(),
            profile.server_url.clone(),
        );

        Ok(Self {
            profile_name,
            profile,
            data_dir,
            server_url,
        })
    }

    pub fn engine_config(&self) -> Result<EngineConfig, CliError> {
        match self.server_url.as_deref() {
            Some(url) => Ok(EngineConfig::for_server(url)?),
            None => Ok(EngineConfig::default()),
        }
    }

    /// Open the store, key directory and keychain session, and make sure the
    /// device keypair exists.
    pub async fn open_engine(&self) -> Result<Engine, CliError> {
        let store = SyncStore::open_path(self.data_dir.join(DATABASE_FILE_NAME))?;
        let keys = Arc::new(FileKeyStore::new(self.data_dir.join(KEYS_DIR_NAME)));
        let session = Arc::new(KeyringSessionStore::new(&self.profile_name));

        let engine = Engine::new(self.engine_config()?, store, keys, session)?;
        engine.ensure_keys().await?;
        Ok(engine)
    }

    /// Lock the data directory for `command`, then open the engine and reset
    /// uploads an earlier run left unfinished.
    pub async fn open_engine_for_upload(
        &self,
        command: &str,
    ) -> Result<(DataDirLock, Engine), CliError> {
        let lock = DataDirLock::acquire(&self.data_dir, command)?;
        let engine = self.open_engine().await?;
        engine.recover_stale_uploads().await?;
        Ok((lock, engine))
    }

    /// Apply `update` to this profile in the saved config and make it active.
    pub fn update_profile(&self, update: impl FnOnce(&mut CliProfile)) -> Result<PathBuf, CliError> {
        let mut config = CliProfilesConfig::load()?;
        update(config.profile_mut_or_default(&self.profile_name));
        config.active_profile = Some(self.profile_name.clone());
        config.save()
    }
}

/// First non-empty of the flag, the environment, then the profile.
pub fn resolve_server_url(
    explicit: Option<String>,
    environment: Option<String>,
    profile: Option<String>,
) -> Option<String> {
    normalize_text_option(explicit)
        .or_else(|| normalize_text_option(environment))
        .or_else(|| normalize_text_option(profile))
}

pub fn resolve_password(explicit: Option<String>) -> Result<String, CliError> {
    if let Some(password) = normalize_password(explicit) {
        return Ok(password);
    }
    if let Some(password) = normalize_password(env::var("PHOTOSYNC_PASSWORD").ok()) {
        return Ok(password);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    normalize_password(Some(line)).ok_or(CliError::EmptyPassword)
}

/// Strip the line terminator only; surrounding spaces are part of a password.
pub fn normalize_password(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim_end_matches(['\r', '\n']);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub id: i64,
    pub file_name: String,
    pub status: String,
    pub local_path: Option<String>,
    pub remote_ref: Option<String>,
    pub resolution: String,
    pub size_bytes: i64,
    pub created_at: i64,
    pub created_at_iso: String,
}

pub fn record_to_list_item(record: &SyncRecord) -> RecordListItem {
    RecordListItem {
        id: record.id.get(),
        file_name: record.file_name.clone(),
        status: record.status.to_string(),
        local_path: record
            .has_local_copy()
            .then(|| record.local_path.clone()),
        remote_ref: record.remote_ref.clone(),
        resolution: record.resolution.clone(),
        size_bytes: record.size_bytes,
        created_at: record.created_at,
        created_at_iso: format_timestamp(record.created_at),
    }
}

pub fn format_record_lines(records: &[SyncRecord]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No records.".to_string()];
    }

    records
        .iter()
        .map(|record| {
            let location = record
                .remote_ref
                .as_deref()
                .unwrap_or(record.local_path.as_str());
            format!(
                "{:>6}  {:<9}  {}  ({})",
                record.id.get(),
                record.status.as_str(),
                record.file_name,
                location
            )
        })
        .collect()
}

pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |time| time.to_rfc3339())
}

pub fn describe_event(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Started { id, file_name } => format!("Uploading {file_name} (#{id})"),
        UploadEvent::Uploaded {
            file_name,
            remote_ref,
            ..
        } => format!("Uploaded {file_name} -> {remote_ref}"),
        UploadEvent::Failed {
            file_name, reason, ..
        } => format!("Failed {file_name}: {reason}"),
        UploadEvent::BackingOff { delay } => {
            format!("Waiting {}s before the next upload", delay.as_secs())
        }
    }
}

pub fn describe_cycle(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::AlreadyRunning => "An upload cycle is already running.".to_string(),
        CycleOutcome::Completed(report) => {
            let mut summary = format!(
                "Upload cycle finished: {} uploaded, {} failed",
                report.uploaded, report.failed
            );
            if let Some(reason) = &report.halted {
                summary.push_str(&format!(" (stopped: {reason})"));
            }
            summary
        }
    }
}
