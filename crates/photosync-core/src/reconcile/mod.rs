//! Merge device media and the server inventory into the record store.
//!
//! Both passes dedupe on exact file name against everything already stored.
//! Two different photos that share a name collide; the second one is skipped.

use std::collections::HashSet;
use std::sync::Arc;

use crate::api::wire::{parse_payload, InventoryPayload};
use crate::api::{RemoteImage, ServerApi};
use crate::crypto::decrypt_hybrid_envelope;
use crate::keystore::DeviceKeyStore;
use crate::media::{inspect_image, MediaEntry, MediaQuery, MediaSource};
use crate::models::{NewSyncRecord, SyncStatus};
use crate::services::SyncStore;
use crate::{Error, Result};

/// Which slice of device media a scan reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Everything, oldest first.
    Full,
    /// Only entries modified after the cursor (or everything when `None`).
    Incremental { after: Option<i64> },
}

impl ScanMode {
    const fn modified_after(self) -> Option<i64> {
        match self {
            Self::Full => None,
            Self::Incremental { after } => after,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub inserted: usize,
    /// Entries whose file name was already stored
    pub skipped_duplicates: usize,
    /// Entries that were missing, unreadable, or not a supported image
    pub skipped_invalid: usize,
    /// Largest `source_modified_time` among inserted device records
    pub newest_source_modified: Option<i64>,
}

impl ReconcileReport {
    fn absorb(&mut self, other: &Self) {
        self.inserted += other.inserted;
        self.skipped_duplicates += other.skipped_duplicates;
        self.skipped_invalid += other.skipped_invalid;
        self.newest_source_modified = match (self.newest_source_modified, other.newest_source_modified) {
            (Some(current), Some(candidate)) => Some(current.max(candidate)),
            (current, candidate) => current.or(candidate),
        };
    }
}

/// Stateless apart from the store; the incremental cursor is an input.
#[derive(Clone)]
pub struct Reconciler {
    store: SyncStore,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(store: SyncStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Record every server image as `UPLOADED` with no local copy.
    pub async fn ingest_remote_inventory(&self, images: Vec<RemoteImage>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut candidates = Vec::with_capacity(images.len());

        for image in images {
            match NewSyncRecord::remote(
                image.remote_ref(),
                image.file_name.as_str(),
                image.size,
                image.resolution.as_str(),
                image.source_id.clone(),
                image.source_modified_time,
            ) {
                Ok(record) => candidates.push(record),
                Err(error) => {
                    tracing::debug!("Skipping remote image {}: {}", image.remote_id, error);
                    report.skipped_invalid += 1;
                }
            }
        }

        let batch = self.insert_unseen(candidates).await?;
        report.inserted = batch.inserted;
        report.skipped_duplicates = batch.skipped_duplicates;

        tracing::info!(
            "Remote inventory: {} inserted, {} already known, {} invalid",
            report.inserted,
            report.skipped_duplicates,
            report.skipped_invalid
        );
        Ok(report)
    }

    /// Page through device media and record new images.
    ///
    /// New records start `PENDING` when auto-upload is on, otherwise `LOCAL`.
    pub async fn scan_device(
        &self,
        source: Arc<dyn MediaSource>,
        mode: ScanMode,
        auto_upload: bool,
    ) -> Result<ReconcileReport> {
        let status = if auto_upload {
            SyncStatus::Pending
        } else {
            SyncStatus::Local
        };
        let mut report = ReconcileReport::default();
        let mut offset = 0;

        loop {
            let query = MediaQuery {
                modified_after: mode.modified_after(),
                limit: self.batch_size,
                offset,
            };
            let source = Arc::clone(&source);
            let (enumerated, candidates, invalid) =
                tokio::task::spawn_blocking(move || read_batch(source.as_ref(), &query, status))
                    .await
                    .map_err(|error| Error::Task(error.to_string()))??;

            let mut batch = self.insert_unseen(candidates).await?;
            batch.skipped_invalid = invalid;
            report.absorb(&batch);

            if enumerated < self.batch_size {
                break;
            }
            offset += enumerated;
        }

        tracing::info!(
            "Device scan ({:?}): {} inserted, {} already known, {} skipped",
            mode,
            report.inserted,
            report.skipped_duplicates,
            report.skipped_invalid
        );
        Ok(report)
    }

    async fn insert_unseen(&self, candidates: Vec<NewSyncRecord>) -> Result<ReconcileReport> {
        let total = candidates.len();
        let mut seen: HashSet<String> = self.store.all_file_names().await?.into_iter().collect();
        let fresh: Vec<NewSyncRecord> = candidates
            .into_iter()
            .filter(|record| seen.insert(record.file_name.clone()))
            .collect();

        let ids = self.store.insert_many_deduped(&fresh).await?;
        let newest_source_modified = fresh
            .iter()
            .filter(|record| record.status != SyncStatus::Uploaded)
            .map(|record| record.source_modified_time)
            .max();

        Ok(ReconcileReport {
            inserted: ids.len(),
            skipped_duplicates: total - ids.len(),
            skipped_invalid: 0,
            newest_source_modified,
        })
    }
}

/// One enumeration page turned into candidate records.
///
/// Returns the raw page size so the caller knows when to stop paging.
fn read_batch(
    source: &dyn MediaSource,
    query: &MediaQuery,
    status: SyncStatus,
) -> Result<(usize, Vec<NewSyncRecord>, usize)> {
    let entries = source.enumerate(query)?;
    let enumerated = entries.len();
    let mut candidates = Vec::with_capacity(enumerated);
    let mut invalid = 0;

    for entry in entries {
        match candidate_from_entry(entry, status) {
            Some(record) => candidates.push(record),
            None => invalid += 1,
        }
    }
    Ok((enumerated, candidates, invalid))
}

fn candidate_from_entry(entry: MediaEntry, status: SyncStatus) -> Option<NewSyncRecord> {
    let info = inspect_image(&entry.path)?;
    NewSyncRecord::local(
        &entry.path,
        status,
        info.size_bytes,
        info.resolution(),
        Some(entry.source_id),
        entry.modified_ms,
    )
    .map_err(|error| tracing::debug!("Skipping {}: {}", entry.path.display(), error))
    .ok()
}

/// Fetch and decrypt the server image list.
pub async fn fetch_remote_inventory(
    api: &dyn ServerApi,
    keys: &dyn DeviceKeyStore,
    token: &str,
) -> Result<Vec<RemoteImage>> {
    let envelope = api.list_images(token).await?.into_envelope("images")?;
    let json = decrypt_hybrid_envelope(&envelope, |ciphertext| {
        keys.decrypt_with_device_key(ciphertext)
    })?;
    Ok(parse_payload::<InventoryPayload, _>(&json, "images")?)
}
