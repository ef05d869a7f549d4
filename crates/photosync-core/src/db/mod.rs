//! Database layer for PhotoSync

mod connection;
mod migrations;
mod repository;
mod settings_repository;

pub use connection::Database;
pub use repository::{SqliteSyncRecordRepository, SyncRecordRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
