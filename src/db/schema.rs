use rusqlite::Connection;

use crate::error::Result;

pub(crate) const VERSION_TABLE: &str = "dbroll_version";
pub(crate) const TASK_TABLE: &str = "dbroll_task";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS dbroll_version (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        version TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS dbroll_task (
        id TEXT PRIMARY KEY,
        updated_at TEXT NOT NULL,
        name TEXT NOT NULL,
        task_order INTEGER NOT NULL,
        version_id TEXT NOT NULL REFERENCES dbroll_version(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_dbroll_task_version ON dbroll_task(version_id);
";

/// True once both history tables exist.
pub fn schema_exists(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN (?, ?)",
        (VERSION_TABLE, TASK_TABLE),
        |row| row.get(0),
    )?;
    Ok(count == 2)
}

/// Create the history tables if they are missing.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    if schema_exists(conn)? {
        return Ok(());
    }

    tracing::info!("Creating version history tables");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
