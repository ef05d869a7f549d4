//! Entry points used by hosts: app start, key exchange, auth, reconciliation
//! and upload triggers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tokio::sync::broadcast;

use crate::api::wire::{
    parse_payload, AckPayload, Credentials, LoginPayload, VerificationCodePayload,
    VerificationRequest,
};
use crate::api::{HttpServerApi, LoginOutcome, ServerApi};
use crate::config::EngineConfig;
use crate::crypto::{
    decrypt_hybrid_envelope, encrypt_for_server, parse_public_key_pem, public_key_fingerprint,
    HybridEnvelope,
};
use crate::error::{KeyError, NetworkError, ProtocolError};
use crate::keystore::DeviceKeyStore;
use crate::media::{inspect_image, MediaSource};
use crate::models::{NewSyncRecord, RecordId, Settings, SyncRecord, SyncStatus};
use crate::reconcile::{fetch_remote_inventory, ReconcileReport, Reconciler, ScanMode};
use crate::services::SyncStore;
use crate::session::SessionStore;
use crate::upload::{CycleOutcome, UploadEvent, UploadGate, UploadProcessor};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Result of [`Engine::run_reconciliation`]. A pass that was skipped or
/// failed is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub remote: Option<ReconcileReport>,
    pub device: Option<ReconcileReport>,
}

/// The sync engine: one store, one key store, one session, one server.
pub struct Engine {
    config: EngineConfig,
    store: SyncStore,
    keys: Arc<dyn DeviceKeyStore>,
    session: Arc<dyn SessionStore>,
    api: Option<Arc<dyn ServerApi>>,
    reconciler: Reconciler,
    gate: UploadGate,
    events: broadcast::Sender<UploadEvent>,
}

impl Engine {
    /// Build an engine; an HTTP client is created when a server URL is set.
    pub fn new(
        config: EngineConfig,
        store: SyncStore,
        keys: Arc<dyn DeviceKeyStore>,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let api = match config.server_url.as_deref() {
            Some(url) => Some(
                Arc::new(HttpServerApi::new(url, config.request_timeout)?) as Arc<dyn ServerApi>
            ),
            None => None,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            reconciler: Reconciler::new(store.clone(), config.scan_batch_size),
            config,
            store,
            keys,
            session,
            api,
            gate: UploadGate::new(),
            events,
        })
    }

    /// Replace the server transport.
    #[must_use]
    pub fn with_server_api(mut self, api: Arc<dyn ServerApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn store(&self) -> &SyncStore {
        &self.store
    }

    /// Receive upload notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Make sure the device keypair exists.
    pub async fn ensure_keys(&self) -> Result<()> {
        let keys = Arc::clone(&self.keys);
        tokio::task::spawn_blocking(move || keys.ensure_device_keypair())
            .await
            .map_err(|error| Error::Task(error.to_string()))??;
        Ok(())
    }

    /// Release records left `UPLOADING` by an interrupted run. Returns how
    /// many were reset.
    ///
    /// Only call this while no other process can be uploading from the same
    /// store, otherwise its in-flight records are handed out twice.
    pub async fn recover_stale_uploads(&self) -> Result<usize> {
        let reset = self.store.reset_stale_uploading().await?;
        if reset > 0 {
            tracing::info!("Reset {} interrupted upload(s) to PENDING", reset);
        }
        Ok(reset)
    }

    fn api(&self) -> Result<&dyn ServerApi> {
        self.api.as_deref().ok_or_else(|| {
            NetworkError::InvalidConfiguration("no server URL configured".to_string()).into()
        })
    }

    fn server_key(&self) -> Result<String> {
        Ok(self.keys.server_public_key()?.ok_or(KeyError::ServerKeyMissing)?)
    }

    fn token(&self) -> Result<String> {
        self.session.load_token()?.ok_or(Error::NotAuthenticated)
    }

    fn open_envelope(&self, envelope: &HybridEnvelope) -> Result<String> {
        Ok(decrypt_hybrid_envelope(envelope, |ciphertext| {
            self.keys.decrypt_with_device_key(ciphertext)
        })?)
    }

    /// PEM of the device public key.
    pub fn device_public_key_pem(&self) -> Result<String> {
        Ok(self.keys.device_public_key_pem()?)
    }

    /// SHA-256 fingerprint of the stored server key, if any.
    pub fn server_key_fingerprint(&self) -> Result<Option<String>> {
        match self.keys.server_public_key()? {
            Some(pem) => Ok(Some(public_key_fingerprint(&pem)?)),
            None => Ok(None),
        }
    }

    /// Fetch the server public key and make it the trusted key.
    ///
    /// Returns the key fingerprint.
    pub async fn connect_server(&self) -> Result<String> {
        let pem = self.api()?.fetch_server_public_key().await?;
        parse_public_key_pem(&pem)?;
        self.keys.store_server_public_key(&pem)?;

        let fingerprint = public_key_fingerprint(&pem)?;
        tracing::info!("Stored server public key {}", fingerprint);
        Ok(fingerprint)
    }

    /// Tell the server which device key to encrypt responses for.
    pub async fn register_client_key(&self, username: &str) -> Result<Option<String>> {
        let pem = self.keys.device_public_key_pem()?;
        let response = self.api()?.register_client_key(username, &pem).await?;
        if response.success {
            Ok(response.message)
        } else {
            Err(ProtocolError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "Client key registration failed".to_string()),
            )
            .into())
        }
    }

    /// Create an account; returns the verification code the server issued.
    pub async fn register(&self, username: &str, password: &str) -> Result<String> {
        let server_key = self.server_key()?;
        let credentials = serde_json::to_string(&Credentials { username, password })?;
        let encrypted = encrypt_for_server(&server_key, &credentials)?;

        let response = self.api()?.register(encrypted).await?;
        if !response.success {
            return Err(ProtocolError::Rejected(
                response
                    .message
                    .unwrap_or_else(|| "Registration failed".to_string()),
            )
            .into());
        }
        let envelope = response.encrypted_verification_code.ok_or_else(|| {
            ProtocolError::MalformedResponse(
                "register: missing encryptedVerificationCode".to_string(),
            )
        })?;
        let json = self.open_envelope(&envelope)?;
        Ok(parse_payload::<VerificationCodePayload, String>(&json, "register")?)
    }

    /// Confirm a registration with the issued code.
    pub async fn verify_registration(
        &self,
        username: &str,
        verification_code: &str,
    ) -> Result<Option<String>> {
        let server_key = self.server_key()?;
        let request = serde_json::to_string(&VerificationRequest {
            username,
            verification_code,
        })?;
        let encrypted = encrypt_for_server(&server_key, &request)?;

        let envelope = self
            .api()?
            .verify_registration(encrypted)
            .await?
            .into_envelope("verify_registration")?;
        let json = self.open_envelope(&envelope)?;
        let ack: AckPayload = serde_json::from_str(&json).map_err(|error| {
            ProtocolError::MalformedResponse(format!("verify_registration: {error}"))
        })?;
        Ok(ack.into_result("verify_registration")?)
    }

    /// Log in and keep the issued token.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let server_key = self.server_key()?;
        let device_key = self.keys.device_public_key_pem()?;
        let credentials = serde_json::to_string(&Credentials { username, password })?;
        let encrypted = encrypt_for_server(&server_key, &credentials)?;

        let envelope = self
            .api()?
            .login(encrypted, &device_key)
            .await?
            .into_envelope("login")?;
        let json = self.open_envelope(&envelope)?;

        match parse_payload::<LoginPayload, LoginOutcome>(&json, "login")? {
            LoginOutcome::Authenticated { token } => {
                self.session.save_token(&token)?;
                tracing::info!("Logged in as {}", username);
                Ok(())
            }
            LoginOutcome::Rejected { message } => Err(ProtocolError::Rejected(message).into()),
        }
    }

    /// Forget the auth token.
    pub fn logout(&self) -> Result<()> {
        self.session.clear_token()?;
        tracing::info!("Logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> Result<bool> {
        Ok(self.session.load_token()?.is_some())
    }

    /// Record the server inventory as uploaded images.
    pub async fn pull_remote_inventory(&self) -> Result<ReconcileReport> {
        let token = self.token()?;
        let images = fetch_remote_inventory(self.api()?, self.keys.as_ref(), &token).await?;
        self.reconciler.ingest_remote_inventory(images).await
    }

    /// Read device media into the store and advance the catch-up cursor.
    pub async fn scan_device(
        &self,
        source: Arc<dyn MediaSource>,
        full: bool,
    ) -> Result<ReconcileReport> {
        let mut settings = self.store.load_settings().await?;
        let mode = if full {
            ScanMode::Full
        } else {
            ScanMode::Incremental {
                after: settings.last_sync_cursor,
            }
        };

        let report = self
            .reconciler
            .scan_device(source, mode, settings.auto_upload)
            .await?;
        if settings.advance_cursor(report.newest_source_modified) {
            self.store.save_sync_cursor(settings.last_sync_cursor).await?;
            tracing::debug!("Sync cursor advanced to {:?}", settings.last_sync_cursor);
        }
        Ok(report)
    }

    /// Remote ingestion (when logged in and keyed) then an incremental device
    /// scan. A failed remote pass is logged and does not stop the scan.
    pub async fn run_reconciliation(
        &self,
        source: Option<Arc<dyn MediaSource>>,
    ) -> Result<ReconciliationSummary> {
        let mut summary = ReconciliationSummary::default();

        let ready = self.api.is_some()
            && self.session.load_token()?.is_some()
            && self.keys.server_public_key()?.is_some();
        if ready {
            match self.pull_remote_inventory().await {
                Ok(report) => summary.remote = Some(report),
                Err(error @ Error::Store(_)) => return Err(error),
                Err(error) => tracing::warn!("Remote inventory pass failed: {}", error),
            }
        } else {
            tracing::debug!("Skipping remote inventory: not connected or not logged in");
        }

        if let Some(source) = source {
            summary.device = Some(self.scan_device(source, false).await?);
        }
        Ok(summary)
    }

    /// One upload cycle; returns `AlreadyRunning` if one is in progress.
    pub async fn run_upload_cycle(&self) -> Result<CycleOutcome> {
        let api = self.api.clone().ok_or_else(|| {
            Error::from(NetworkError::InvalidConfiguration(
                "no server URL configured".to_string(),
            ))
        })?;
        let processor = UploadProcessor::new(
            self.store.clone(),
            Arc::clone(&self.keys),
            api,
            Arc::clone(&self.session),
            self.gate.clone(),
            self.events.clone(),
            self.config.retry_backoff,
        );
        processor.run_cycle().await
    }

    /// Queue one file explicitly. Returns `None` when a record with the same
    /// file name already exists.
    pub async fn enqueue(&self, path: impl AsRef<Path>) -> Result<Option<RecordId>> {
        let path = path.as_ref().to_path_buf();
        let record = tokio::task::spawn_blocking(move || pending_record_for(&path))
            .await
            .map_err(|error| Error::Task(error.to_string()))??;

        let ids = self.store.insert_many_deduped(&[record]).await?;
        Ok(ids.first().copied())
    }

    /// Move a `LOCAL` or `FAILED` record back to `PENDING`.
    pub async fn requeue(&self, id: RecordId) -> Result<()> {
        let record = self
            .store
            .by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        if self.store.requeue(id).await? {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "record {id} is {} and cannot be queued",
                record.status
            )))
        }
    }

    /// Record count per status.
    pub async fn status_summary(&self) -> Result<Vec<(SyncStatus, usize)>> {
        self.store.status_counts().await
    }

    /// Records newest first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<SyncRecord>> {
        self.store.list(limit, offset).await
    }

    pub async fn by_status(&self, status: SyncStatus) -> Result<Vec<SyncRecord>> {
        self.store.by_status(status).await
    }

    pub async fn settings(&self) -> Result<Settings> {
        self.store.load_settings().await
    }

    /// Persist the auto-upload preference used by later device scans.
    pub async fn set_auto_upload(&self, enabled: bool) -> Result<()> {
        self.store.save_auto_upload(enabled).await
    }
}

fn pending_record_for(path: &Path) -> Result<NewSyncRecord> {
    let path: PathBuf = std::fs::canonicalize(path)
        .map_err(|error| Error::InvalidInput(format!("{}: {error}", path.display())))?;
    let info = inspect_image(&path)
        .ok_or_else(|| Error::InvalidInput(format!("not a supported image: {}", path.display())))?;
    let modified_ms = std::fs::metadata(&path)?
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));

    NewSyncRecord::local(
        &path,
        SyncStatus::Pending,
        info.size_bytes,
        info.resolution(),
        None,
        modified_ms,
    )
}
