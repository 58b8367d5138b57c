pub mod models;
pub mod repositories;

use crate::error::{EngineError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open an existing backup database. A missing file is reported instead of
/// silently creating an empty one.
pub fn open_existing(db_path: &Path) -> Result<Connection> {
    if !db_path.is_file() {
        return Err(EngineError::StorageUnavailable {
            what: "Database",
            path: db_path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    configure(&conn)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Open an existing backup database for reading only. No schema changes are
/// made, so diagnostics work on read-only files and never migrate the store.
pub fn open_read_only(db_path: &Path) -> Result<Connection> {
    if !db_path.is_file() {
        return Err(EngineError::StorageUnavailable {
            what: "Database",
            path: db_path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    configure(&conn)?;
    if !has_table(&conn, "files")? {
        return Err(EngineError::StorageUnavailable {
            what: "Table `files` in database",
            path: db_path.to_path_buf(),
        });
    }
    Ok(conn)
}

/// Open or create a database, used by the upload path and by tests.
pub fn open_or_create(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    initialize_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// Create the `files` table if needed and bring older layouts up to date.
fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            file_hash TEXT,
            created_at TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // Databases written by earlier server versions lack the size column.
    if !has_column(conn, "files", "file_size")? {
        log::info!("adding file_size column to files table");
        conn.execute(
            "ALTER TABLE files ADD COLUMN file_size INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_files_owner_filename ON files(user_id, filename)",
        [],
    )?;

    Ok(())
}

pub(crate) fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}
