//! Settings repository implementation

use crate::error::{Result, StoreError};
use crate::models::Settings;
use rusqlite::{params, Connection, OptionalExtension};

const AUTO_UPLOAD_KEY: &str = "auto_upload";
const LAST_SYNC_CURSOR_KEY: &str = "last_sync_cursor";

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load settings from the database
    fn load(&self) -> Result<Settings>;

    /// Save settings to the database
    fn save(&self, settings: &Settings) -> Result<()>;

    /// Write the auto-upload flag, leaving the cursor untouched
    fn save_auto_upload(&self, enabled: bool) -> Result<()>;

    /// Write the catch-up cursor, leaving the auto-upload flag untouched
    fn save_sync_cursor(&self, cursor: Option<i64>) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", params![key])?;
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load(&self) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(value) = self.get_setting(AUTO_UPLOAD_KEY)? {
            settings.auto_upload = parse_bool(&value);
        }

        if let Some(value) = self.get_setting(LAST_SYNC_CURSOR_KEY)? {
            let cursor = value.trim().parse::<i64>().map_err(|_| {
                StoreError::CorruptRecord(format!("{LAST_SYNC_CURSOR_KEY} = {value:?}"))
            })?;
            settings.last_sync_cursor = Some(cursor);
        }

        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        self.save_auto_upload(settings.auto_upload)?;
        self.save_sync_cursor(settings.last_sync_cursor)
    }

    fn save_auto_upload(&self, enabled: bool) -> Result<()> {
        self.set_setting(AUTO_UPLOAD_KEY, if enabled { "true" } else { "false" })
    }

    fn save_sync_cursor(&self, cursor: Option<i64>) -> Result<()> {
        match cursor {
            Some(cursor) => self.set_setting(LAST_SYNC_CURSOR_KEY, &cursor.to_string()),
            None => self.delete_setting(LAST_SYNC_CURSOR_KEY),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
