//! Data models for PhotoSync

mod record;
mod settings;

pub use record::{NewSyncRecord, RecordId, SyncRecord, SyncStatus};
pub use settings::Settings;
