//! Upload state machine.
//!
//! One cycle claims eligible records oldest first, uploads each, and records
//! the outcome. A failure inside an attempt never escapes the attempt; only
//! store errors abort the cycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::gate::UploadGate;
use crate::api::wire::{parse_payload, UploadPayload};
use crate::api::{ServerApi, UploadMetadata, UploadOutcome, UploadRequest};
use crate::crypto::{decrypt_hybrid_envelope, encrypt_for_server};
use crate::error::NetworkError;
use crate::keystore::DeviceKeyStore;
use crate::media::content_type_for;
use crate::models::{RecordId, SyncRecord, SyncStatus};
use crate::services::SyncStore;
use crate::session::SessionStore;
use crate::{Error, Result};

/// Why an attempt ended in `FAILED`. Display text is user-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("Authentication error")]
    MissingToken,

    #[error("Encryption error")]
    MissingServerKey,

    #[error("File not found")]
    FileNotFound,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {}", server_status_text(*.0))]
    ServerStatus(u16),

    #[error("Decryption error")]
    Decryption,

    /// Server answered `success: false`
    #[error("{0}")]
    Rejected(String),

    #[error("Error processing response: {0}")]
    InvalidResponse(String),

    #[error("Upload error: {0}")]
    Preparation(String),
}

fn server_status_text(status: u16) -> String {
    match status {
        401 => "Unauthorized".to_string(),
        404 => "Not found".to_string(),
        other => format!("Error code {other}"),
    }
}

impl FailureReason {
    /// Failures that would repeat for every record until the user acts.
    pub const fn halts_cycle(&self) -> bool {
        matches!(self, Self::MissingToken | Self::MissingServerKey)
    }

    fn from_transport(error: Error) -> Self {
        match error {
            Error::Network(NetworkError::Status { status, .. }) => Self::ServerStatus(status),
            Error::Network(NetworkError::Http(error)) => Self::Network(error.to_string()),
            Error::Network(NetworkError::InvalidConfiguration(message)) => Self::Network(message),
            Error::Protocol(error) => Self::InvalidResponse(error.to_string()),
            other => Self::Preparation(other.to_string()),
        }
    }
}

/// Result of one attempt on one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Uploaded { remote_ref: String },
    Failed(FailureReason),
}

/// Best-effort progress notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started {
        id: RecordId,
        file_name: String,
    },
    Uploaded {
        id: RecordId,
        file_name: String,
        remote_ref: String,
    },
    Failed {
        id: RecordId,
        file_name: String,
        reason: FailureReason,
    },
    BackingOff {
        delay: Duration,
    },
}

/// Totals for one drained cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub uploaded: usize,
    pub failed: usize,
    /// Set when the cycle stopped early on a missing token or server key.
    pub halted: Option<FailureReason>,
}

/// What `run_cycle` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle holds the gate; nothing was claimed.
    AlreadyRunning,
    Completed(CycleReport),
}

/// Drives records through `PENDING|FAILED -> UPLOADING -> UPLOADED|FAILED`.
#[derive(Clone)]
pub struct UploadProcessor {
    store: SyncStore,
    keys: Arc<dyn DeviceKeyStore>,
    api: Arc<dyn ServerApi>,
    session: Arc<dyn SessionStore>,
    gate: UploadGate,
    events: broadcast::Sender<UploadEvent>,
    backoff: Duration,
}

impl UploadProcessor {
    pub fn new(
        store: SyncStore,
        keys: Arc<dyn DeviceKeyStore>,
        api: Arc<dyn ServerApi>,
        session: Arc<dyn SessionStore>,
        gate: UploadGate,
        events: broadcast::Sender<UploadEvent>,
        backoff: Duration,
    ) -> Self {
        Self {
            store,
            keys,
            api,
            session,
            gate,
            events,
            backoff,
        }
    }

    /// Drain eligible records.
    ///
    /// Each record is attempted at most once per cycle: records that fail
    /// are left for the next cycle. After a failure the cycle waits the
    /// backoff before claiming again; after a success it claims right away.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(_permit) = self.gate.try_acquire() else {
            tracing::debug!("Upload cycle already running; skipping trigger");
            return Ok(CycleOutcome::AlreadyRunning);
        };

        let mut report = CycleReport::default();
        let mut cursor = None;

        while let Some(record) = self.store.claim_next(cursor).await? {
            cursor = Some((record.created_at, record.id));
            tracing::info!("Uploading {} (record {})", record.file_name, record.id);
            self.emit(UploadEvent::Started {
                id: record.id,
                file_name: record.file_name.clone(),
            });

            match self.attempt(&record).await {
                AttemptOutcome::Uploaded { remote_ref } => {
                    self.store.set_uploaded(record.id, &remote_ref).await?;
                    report.uploaded += 1;
                    tracing::info!("Uploaded {} as {}", record.file_name, remote_ref);
                    self.emit(UploadEvent::Uploaded {
                        id: record.id,
                        file_name: record.file_name,
                        remote_ref,
                    });
                }
                AttemptOutcome::Failed(reason) => {
                    self.store.update_status(record.id, SyncStatus::Failed).await?;
                    report.failed += 1;
                    tracing::warn!("Upload failed for {}: {}", record.file_name, reason);
                    self.emit(UploadEvent::Failed {
                        id: record.id,
                        file_name: record.file_name,
                        reason: reason.clone(),
                    });

                    if reason.halts_cycle() {
                        report.halted = Some(reason);
                        break;
                    }
                    if self.store.next_eligible(cursor).await?.is_some() {
                        tracing::debug!("Backing off for {:?}", self.backoff);
                        self.emit(UploadEvent::BackingOff {
                            delay: self.backoff,
                        });
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Ok(CycleOutcome::Completed(report))
    }

    /// Upload one claimed record. Never returns an error.
    pub async fn attempt(&self, record: &SyncRecord) -> AttemptOutcome {
        match self.try_upload(record).await {
            Ok(remote_ref) => AttemptOutcome::Uploaded { remote_ref },
            Err(reason) => AttemptOutcome::Failed(reason),
        }
    }

    async fn try_upload(&self, record: &SyncRecord) -> std::result::Result<String, FailureReason> {
        let token = match self.session.load_token() {
            Ok(Some(token)) => token,
            Ok(None) => return Err(FailureReason::MissingToken),
            Err(error) => {
                tracing::warn!("Could not read auth token: {}", error);
                return Err(FailureReason::MissingToken);
            }
        };
        let server_key = match self.keys.server_public_key() {
            Ok(Some(pem)) => pem,
            Ok(None) => return Err(FailureReason::MissingServerKey),
            Err(error) => {
                tracing::warn!("Could not read server public key: {}", error);
                return Err(FailureReason::MissingServerKey);
            }
        };

        let path = PathBuf::from(&record.local_path);
        let bytes = read_local_file(record, path.clone()).await?;

        let metadata = UploadMetadata {
            file_name: record.file_name.clone(),
            size: record.size_bytes,
            resolution: record.resolution.clone(),
            source_id: record.source_id.clone(),
            source_modified_time: record.source_modified_time,
        };
        let metadata = serde_json::to_string(&metadata)
            .map_err(|error| FailureReason::Preparation(error.to_string()))?;
        let metadata = encrypt_for_server(&server_key, &metadata)
            .map_err(|error| FailureReason::Preparation(error.to_string()))?;

        let request = UploadRequest {
            auth: format!("Bearer {token}"),
            metadata,
            file_name: record.file_name.clone(),
            content_type: content_type_for(&path).to_string(),
            bytes,
        };
        let response = self
            .api
            .upload(request)
            .await
            .map_err(FailureReason::from_transport)?;

        let envelope = response.into_envelope("upload").map_err(|error| {
            tracing::debug!("{}", error);
            FailureReason::Decryption
        })?;
        let json = decrypt_hybrid_envelope(&envelope, |ciphertext| {
            self.keys.decrypt_with_device_key(ciphertext)
        })
        .map_err(|error| {
            tracing::debug!("Upload response for {} did not decrypt: {}", record.file_name, error);
            FailureReason::Decryption
        })?;

        match parse_payload::<UploadPayload, UploadOutcome>(&json, "upload")
            .map_err(|error| FailureReason::InvalidResponse(error.to_string()))?
        {
            UploadOutcome::Stored { remote_ref } => Ok(remote_ref),
            UploadOutcome::Rejected { message } => Err(FailureReason::Rejected(message)),
        }
    }

    fn emit(&self, event: UploadEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

async fn read_local_file(
    record: &SyncRecord,
    path: PathBuf,
) -> std::result::Result<Vec<u8>, FailureReason> {
    if !record.has_local_copy() {
        return Err(FailureReason::FileNotFound);
    }

    let read = tokio::task::spawn_blocking(move || std::fs::read(path))
        .await
        .map_err(|error| FailureReason::Preparation(error.to_string()))?;
    match read {
        Ok(bytes) => Ok(bytes),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(FailureReason::FileNotFound)
        }
        Err(error) => Err(FailureReason::Preparation(error.to_string())),
    }
}
