//! Sync record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{NewSyncRecord, RecordId, SyncRecord, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension};

const RECORD_COLUMNS: &str = "id, local_path, remote_ref, status, size_bytes, resolution, \
     source_id, source_modified_time, file_name, created_at";

/// Trait for sync record storage operations
pub trait SyncRecordRepository {
    /// Insert one record and return its id
    fn insert(&self, record: &NewSyncRecord) -> Result<RecordId>;

    /// Insert records whose file name is not stored yet, in one transaction
    fn insert_many_deduped(&self, records: &[NewSyncRecord]) -> Result<Vec<RecordId>>;

    /// Set the status of a record (use `set_uploaded` to reach `UPLOADED`)
    fn update_status(&self, id: RecordId, status: SyncStatus) -> Result<()>;

    /// Mark a record uploaded and store its remote reference
    fn set_uploaded(&self, id: RecordId, remote_ref: &str) -> Result<()>;

    /// Oldest `PENDING`/`FAILED` record by creation time
    fn oldest_eligible_for_upload(&self) -> Result<Option<SyncRecord>>;

    /// Oldest eligible record strictly after the given `(created_at, id)` position
    fn oldest_eligible_after(&self, after: Option<(i64, RecordId)>) -> Result<Option<SyncRecord>>;

    /// Move an eligible record to `UPLOADING`; false if it was no longer eligible
    fn mark_uploading(&self, id: RecordId) -> Result<bool>;

    /// Move a `LOCAL` or `FAILED` record back to `PENDING`
    fn requeue(&self, id: RecordId) -> Result<bool>;

    /// Reset every `UPLOADING` record to `PENDING`, returning how many changed
    fn reset_stale_uploading(&self) -> Result<usize>;

    /// Records in the given status, newest first
    fn by_status(&self, status: SyncStatus) -> Result<Vec<SyncRecord>>;

    /// Get a record by id
    fn by_id(&self, id: RecordId) -> Result<Option<SyncRecord>>;

    /// Get a record by its device path
    fn by_local_path(&self, path: &str) -> Result<Option<SyncRecord>>;

    /// List all records, newest first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<SyncRecord>>;

    /// Largest device modification time seen so far
    fn most_recent_source_modified_time(&self) -> Result<Option<i64>>;

    /// Every stored file name
    fn all_file_names(&self) -> Result<Vec<String>>;

    /// Record count per status
    fn status_counts(&self) -> Result<Vec<(SyncStatus, usize)>>;
}

/// `SQLite` implementation of `SyncRecordRepository`
pub struct SqliteSyncRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn insert_with(conn: &Connection, record: &NewSyncRecord) -> Result<RecordId> {
        record.validate()?;
        conn.execute(
            "INSERT INTO sync_records (local_path, remote_ref, status, size_bytes, resolution,
                source_id, source_modified_time, file_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.local_path,
                record.remote_ref,
                record.status.as_str(),
                record.size_bytes,
                record.resolution,
                record.source_id,
                record.source_modified_time,
                record.file_name,
                record.created_at,
            ],
        )?;
        Ok(RecordId::new(conn.last_insert_rowid()))
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SyncRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn query_record(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<SyncRecord>> {
        let result = self.conn.query_row(sql, params, Self::parse_record);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse a record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRecord> {
        let status: String = row.get(3)?;
        let status = status.parse::<SyncStatus>().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;

        Ok(SyncRecord {
            id: RecordId::new(row.get(0)?),
            local_path: row.get(1)?,
            remote_ref: row.get(2)?,
            status,
            size_bytes: row.get(4)?,
            resolution: row.get(5)?,
            source_id: row.get(6)?,
            source_modified_time: row.get(7)?,
            file_name: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl SyncRecordRepository for SqliteSyncRecordRepository<'_> {
    fn insert(&self, record: &NewSyncRecord) -> Result<RecordId> {
        Self::insert_with(self.conn, record)
    }

    fn insert_many_deduped(&self, records: &[NewSyncRecord]) -> Result<Vec<RecordId>> {
        for record in records {
            record.validate()?;
        }

        let tx = self.conn.unchecked_transaction()?;

        let mut seen = {
            let mut stmt = tx.prepare("SELECT file_name FROM sync_records")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            names.collect::<rusqlite::Result<HashSet<_>>>()?
        };

        let mut ids = Vec::new();
        for record in records {
            if !seen.insert(record.file_name.clone()) {
                continue;
            }
            ids.push(Self::insert_with(&tx, record)?);
        }

        tx.commit()?;
        Ok(ids)
    }

    fn update_status(&self, id: RecordId, status: SyncStatus) -> Result<()> {
        if status == SyncStatus::Uploaded {
            return Err(Error::InvalidInput(
                "Use set_uploaded to mark a record uploaded".to_string(),
            ));
        }

        let rows = self.conn.execute(
            "UPDATE sync_records SET status = ? WHERE id = ?",
            params![status.as_str(), id.get()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_uploaded(&self, id: RecordId, remote_ref: &str) -> Result<()> {
        let remote_ref = remote_ref.trim();
        if remote_ref.is_empty() {
            return Err(Error::InvalidInput(
                "Remote reference cannot be empty".to_string(),
            ));
        }

        let rows = self.conn.execute(
            "UPDATE sync_records SET status = 'UPLOADED', remote_ref = ? WHERE id = ?",
            params![remote_ref, id.get()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn oldest_eligible_for_upload(&self) -> Result<Option<SyncRecord>> {
        self.oldest_eligible_after(None)
    }

    fn oldest_eligible_after(&self, after: Option<(i64, RecordId)>) -> Result<Option<SyncRecord>> {
        let (created_at, id) = after.map_or((i64::MIN, i64::MIN), |(created_at, id)| {
            (created_at, id.get())
        });

        self.query_record(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM sync_records
                 WHERE status IN ('PENDING', 'FAILED')
                   AND (created_at > ?1 OR (created_at = ?1 AND id > ?2))
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1"
            ),
            params![created_at, id],
        )
    }

    fn mark_uploading(&self, id: RecordId) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sync_records SET status = 'UPLOADING'
             WHERE id = ? AND status IN ('PENDING', 'FAILED')",
            params![id.get()],
        )?;
        Ok(rows == 1)
    }

    fn requeue(&self, id: RecordId) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sync_records SET status = 'PENDING'
             WHERE id = ? AND status IN ('LOCAL', 'FAILED')",
            params![id.get()],
        )?;
        Ok(rows == 1)
    }

    fn reset_stale_uploading(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE sync_records SET status = 'PENDING' WHERE status = 'UPLOADING'",
            [],
        )?;
        Ok(rows)
    }

    fn by_status(&self, status: SyncStatus) -> Result<Vec<SyncRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM sync_records
                 WHERE status = ?
                 ORDER BY created_at DESC, id DESC"
            ),
            params![status.as_str()],
        )
    }

    fn by_id(&self, id: RecordId) -> Result<Option<SyncRecord>> {
        self.query_record(
            &format!("SELECT {RECORD_COLUMNS} FROM sync_records WHERE id = ?"),
            params![id.get()],
        )
    }

    fn by_local_path(&self, path: &str) -> Result<Option<SyncRecord>> {
        if path.is_empty() {
            return Ok(None);
        }
        self.query_record(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM sync_records
                 WHERE local_path = ?
                 ORDER BY id ASC
                 LIMIT 1"
            ),
            params![path],
        )
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<SyncRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM sync_records
                 ORDER BY created_at DESC, id DESC
                 LIMIT ? OFFSET ?"
            ),
            params![limit as i64, offset as i64],
        )
    }

    fn most_recent_source_modified_time(&self) -> Result<Option<i64>> {
        let value = self
            .conn
            .query_row(
                "SELECT MAX(source_modified_time) FROM sync_records WHERE local_path <> ''",
                [],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(value)
    }

    fn all_file_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT file_name FROM sync_records")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn status_counts(&self) -> Result<Vec<(SyncStatus, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM sync_records GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(SyncStatus::ALL
            .into_iter()
            .map(|status| {
                let count = rows
                    .iter()
                    .find(|(name, _)| name == status.as_str())
                    .map_or(0, |(_, count)| usize::try_from(*count).unwrap_or(0));
                (status, count)
            })
            .collect())
    }
}
