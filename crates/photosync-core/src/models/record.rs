//! Sync record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Locally assigned record identifier (`SQLite` rowid, never reused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw row id.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw row id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("Invalid record id: {s}")))
    }
}

/// Upload state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Known locally, not queued
    Local,
    /// Queued for upload
    Pending,
    /// Upload in flight
    Uploading,
    /// Stored on the server
    Uploaded,
    /// Last attempt failed; eligible for retry
    Failed,
}

impl SyncStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Local,
        Self::Pending,
        Self::Uploading,
        Self::Uploaded,
        Self::Failed,
    ];

    /// Column representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Pending => "PENDING",
            Self::Uploading => "UPLOADING",
            Self::Uploaded => "UPLOADED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the upload processor may claim a record in this state.
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOCAL" => Ok(Self::Local),
            "PENDING" => Ok(Self::Pending),
            "UPLOADING" => Ok(Self::Uploading),
            "UPLOADED" => Ok(Self::Uploaded),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// One media item known to the engine, local or remote-origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Local identifier.
    pub id: RecordId,
    /// Absolute device path; empty for server-only records.
    pub local_path: String,
    /// Server-side reference once uploaded.
    pub remote_ref: Option<String>,
    /// Current state.
    pub status: SyncStatus,
    /// File size in bytes.
    pub size_bytes: i64,
    /// `"{width}x{height}"`.
    pub resolution: String,
    /// Device media-store identifier.
    pub source_id: Option<String>,
    /// Device-reported modification time (Unix ms).
    pub source_modified_time: i64,
    /// Dedup key (case-sensitive).
    pub file_name: String,
    /// Insertion time (Unix ms).
    pub created_at: i64,
}

impl SyncRecord {
    /// Whether this record has a local copy on the device.
    pub fn has_local_copy(&self) -> bool {
        !self.local_path.is_empty()
    }
}

/// A record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncRecord {
    pub local_path: String,
    pub remote_ref: Option<String>,
    pub status: SyncStatus,
    pub size_bytes: i64,
    pub resolution: String,
    pub source_id: Option<String>,
    pub source_modified_time: i64,
    pub file_name: String,
    pub created_at: i64,
}

impl NewSyncRecord {
    /// Build a record for a file on the device.
    ///
    /// The file name is taken from the last path component.
    pub fn local(
        path: impl AsRef<Path>,
        status: SyncStatus,
        size_bytes: i64,
        resolution: impl Into<String>,
        source_id: Option<String>,
        source_modified_time: i64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Path has no file name: {}", path.display()))
            })?;
        if status == SyncStatus::Uploaded || status == SyncStatus::Uploading {
            return Err(Error::InvalidInput(format!(
                "Local records cannot start as {status}"
            )));
        }

        Ok(Self {
            local_path: path.to_string_lossy().to_string(),
            remote_ref: None,
            status,
            size_bytes,
            resolution: resolution.into(),
            source_id,
            source_modified_time,
            file_name,
            created_at: crate::util::unix_millis_now(),
        })
    }

    /// Build an already-uploaded record from the server inventory.
    pub fn remote(
        remote_ref: impl Into<String>,
        file_name: impl Into<String>,
        size_bytes: i64,
        resolution: impl Into<String>,
        source_id: Option<String>,
        source_modified_time: i64,
    ) -> Result<Self> {
        let remote_ref = remote_ref.into().trim().to_string();
        let file_name = file_name.into();
        if remote_ref.is_empty() {
            return Err(Error::InvalidInput(
                "Uploaded record requires a remote reference".to_string(),
            ));
        }
        if file_name.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Record file name cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            local_path: String::new(),
            remote_ref: Some(remote_ref),
            status: SyncStatus::Uploaded,
            size_bytes,
            resolution: resolution.into(),
            source_id,
            source_modified_time,
            file_name,
            created_at: crate::util::unix_millis_now(),
        })
    }

    /// Override the insertion timestamp.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(Error::InvalidInput(
                "Record file name cannot be empty".to_string(),
            ));
        }
        let has_remote_ref = self
            .remote_ref
            .as_deref()
            .is_some_and(|remote_ref| !remote_ref.is_empty());
        if self.status == SyncStatus::Uploaded && !has_remote_ref {
            return Err(Error::InvalidInput(format!(
                "Uploaded record {} requires a remote reference",
                self.file_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_text() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn only_pending_and_failed_are_eligible() {
        let eligible: Vec<_> = SyncStatus::ALL
            .into_iter()
            .filter(|status| status.is_eligible())
            .collect();
        assert_eq!(eligible, vec![SyncStatus::Pending, SyncStatus::Failed]);
    }

    #[test]
    fn local_record_takes_file_name_from_path() {
        let record = NewSyncRecord::local(
            "/photos/2024/IMG_0001.jpg",
            SyncStatus::Pending,
            1024,
            "4032x3024",
            Some("42".to_string()),
            1_700_000_000_000,
        )
        .unwrap();
        assert_eq!(record.file_name, "IMG_0001.jpg");
        assert_eq!(record.remote_ref, None);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn local_record_cannot_start_uploaded() {
        assert!(NewSyncRecord::local("/a.jpg", SyncStatus::Uploaded, 1, "1x1", None, 0).is_err());
    }

    #[test]
    fn remote_record_requires_remote_ref() {
        assert!(NewSyncRecord::remote("  ", "a.jpg", 1, "1x1", None, 0).is_err());

        let record = NewSyncRecord::remote("uploads/a.jpg", "a.jpg", 1, "1x1", None, 0).unwrap();
        assert_eq!(record.status, SyncStatus::Uploaded);
        assert!(record.local_path.is_empty());
    }

    #[test]
    fn record_id_parses_from_text() {
        assert_eq!("17".parse::<RecordId>().unwrap(), RecordId::new(17));
        assert!("abc".parse::<RecordId>().is_err());
    }
}
