//! Shared sync record store used by the reconciler, upload processor and clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    Database, SettingsRepository, SqliteSettingsRepository, SqliteSyncRecordRepository,
    SyncRecordRepository,
};
use crate::models::{NewSyncRecord, RecordId, Settings, SyncRecord, SyncStatus};
use crate::Result;

/// Thread-safe service for store and settings operations.
///
/// Every call holds the database lock for its whole duration, so a
/// select-then-update sequence such as [`SyncStore::claim_next`] cannot
/// interleave with another writer.
#[derive(Clone)]
pub struct SyncStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl SyncStore {
    /// Open a store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and recreated once. A
    /// damaged database is left in place and its error returned.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path) {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Quarantining and recreating.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path)?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location of the store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = crate::util::unix_millis_now();
            let base_name = db_path
                .file_name()
                .map_or_else(|| "photosync.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale database sidecar {}", path.display());
            }
        }

        Ok(())
    }

    /// Insert one record.
    pub async fn insert(&self, record: &NewSyncRecord) -> Result<RecordId> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).insert(record)
    }

    /// Insert records with unseen file names in one transaction.
    pub async fn insert_many_deduped(&self, records: &[NewSyncRecord]) -> Result<Vec<RecordId>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).insert_many_deduped(records)
    }

    /// Set a record's status.
    pub async fn update_status(&self, id: RecordId, status: SyncStatus) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).update_status(id, status)
    }

    /// Mark a record uploaded with its remote reference.
    pub async fn set_uploaded(&self, id: RecordId, remote_ref: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).set_uploaded(id, remote_ref)
    }

    /// Oldest record eligible for upload.
    pub async fn oldest_eligible_for_upload(&self) -> Result<Option<SyncRecord>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).oldest_eligible_for_upload()
    }

    /// Oldest eligible record after `after`, without claiming it.
    pub async fn next_eligible(&self, after: Option<(i64, RecordId)>) -> Result<Option<SyncRecord>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).oldest_eligible_after(after)
    }

    /// Select the oldest eligible record after `after` and move it to `UPLOADING`.
    ///
    /// Returns the record as it is after the transition.
    pub async fn claim_next(&self, after: Option<(i64, RecordId)>) -> Result<Option<SyncRecord>> {
        let db = self.db.lock().await;
        let repo = SqliteSyncRecordRepository::new(db.connection());

        let Some(mut record) = repo.oldest_eligible_after(after)? else {
            return Ok(None);
        };
        if !repo.mark_uploading(record.id)? {
            return Ok(None);
        }
        record.status = SyncStatus::Uploading;
        Ok(Some(record))
    }

    /// Move a `LOCAL` or `FAILED` record back to `PENDING`.
    pub async fn requeue(&self, id: RecordId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).requeue(id)
    }

    /// Reset orphaned `UPLOADING` records to `PENDING`.
    pub async fn reset_stale_uploading(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).reset_stale_uploading()
    }

    /// Records in a status, newest first.
    pub async fn by_status(&self, status: SyncStatus) -> Result<Vec<SyncRecord>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).by_status(status)
    }

    /// Fetch a record by id.
    pub async fn by_id(&self, id: RecordId) -> Result<Option<SyncRecord>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).by_id(id)
    }

    /// Fetch a record by device path.
    pub async fn by_local_path(&self, path: &str) -> Result<Option<SyncRecord>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).by_local_path(path)
    }

    /// List records newest-first.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<SyncRecord>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).list(limit, offset)
    }

    /// Largest device modification time stored.
    pub async fn most_recent_source_modified_time(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).most_recent_source_modified_time()
    }

    /// All stored file names.
    pub async fn all_file_names(&self) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).all_file_names()
    }

    /// Record count per status.
    pub async fn status_counts(&self) -> Result<Vec<(SyncStatus, usize)>> {
        let db = self.db.lock().await;
        SqliteSyncRecordRepository::new(db.connection()).status_counts()
    }

    /// Load settings.
    pub async fn load_settings(&self) -> Result<Settings> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).load()
    }

    /// Save settings.
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).save(settings)
    }

    /// Save only the auto-upload preference.
    pub async fn save_auto_upload(&self, enabled: bool) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).save_auto_upload(enabled)
    }

    /// Save only the catch-up cursor.
    pub async fn save_sync_cursor(&self, cursor: Option<i64>) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).save_sync_cursor(cursor)
    }
}
