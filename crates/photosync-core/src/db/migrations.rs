//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply a list of statements in one transaction, rolling back on failure
fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute_batch("BEGIN TRANSACTION")?;

    for stmt in statements {
        if let Err(e) = conn.execute_batch(stmt) {
            conn.execute_batch("ROLLBACK").ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute_batch("COMMIT") {
        conn.execute_batch("ROLLBACK").ok();
        return Err(e.into());
    }
    Ok(())
}

/// Migration to version 1: Initial schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            // Schema version tracking
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // AUTOINCREMENT keeps ids from being reused
            "CREATE TABLE IF NOT EXISTS sync_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                local_path TEXT NOT NULL DEFAULT '',
                remote_ref TEXT,
                status TEXT NOT NULL,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                resolution TEXT NOT NULL DEFAULT '',
                source_id TEXT,
                source_modified_time INTEGER NOT NULL DEFAULT 0,
                file_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                CHECK (status IN ('LOCAL', 'PENDING', 'UPLOADING', 'UPLOADED', 'FAILED')),
                CHECK (status <> 'UPLOADED' OR (remote_ref IS NOT NULL AND remote_ref <> ''))
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_records_status_created
                ON sync_records(status, created_at, id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_records_file_name ON sync_records(file_name)",
            // Settings table (local only)
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: lookups used by reconciliation and path queries
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE INDEX IF NOT EXISTS idx_sync_records_local_path ON sync_records(local_path)",
            "CREATE INDEX IF NOT EXISTS idx_sync_records_source_modified
                ON sync_records(source_modified_time)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )?;

    tracing::info!("Migrated database to version {}", CURRENT_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_uploaded_requires_remote_ref() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sync_records (status, file_name, created_at) VALUES ('UPLOADED', 'a.jpg', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
