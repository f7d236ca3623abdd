mod schema;

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::tasks::Task;
use crate::version::{Version, VersionScheme};

/// Locator that opens a private in-memory database.
pub const MEMORY_LOCATOR: &str = ":memory:";

/// The target database a run is applied to.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database from a locator: a file path, `file:` URI or `:memory:`.
    ///
    /// Network URLs (`postgres://…`) are rejected; only SQLite targets are served.
    pub fn connect(locator: &str) -> Result<Self> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(Error::InvalidArgument(
                "database location must not be empty".to_string(),
            ));
        }
        if locator == MEMORY_LOCATOR {
            return Self::open_memory();
        }
        if let Some((scheme, _)) = locator.split_once("://") {
            if !scheme.eq_ignore_ascii_case("file") {
                return Err(Error::UnsupportedConnection(format!(
                    "\"{}\" connections are not supported",
                    scheme
                )));
            }
        }
        if let Some(path) = locator.strip_prefix("file://") {
            return Self::open(path);
        }
        if locator.starts_with("file:") {
            return Self::open_uri(locator);
        }
        Self::open(locator)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        create_parent_dir(path)?;
        Self::configure(Connection::open(path)?)
    }

    /// Open a SQLite `file:` URI, keeping its query parameters.
    fn open_uri(uri: &str) -> Result<Self> {
        create_parent_dir(Path::new(uri_path(uri)))?;
        Self::configure(Connection::open(uri)?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// File path portion of a `file:` URI, without its query string.
fn uri_path(uri: &str) -> &str {
    let path = uri.strip_prefix("file:").unwrap_or(uri);
    path.split_once('?').map_or(path, |(path, _)| path)
}

/// Reads and writes installed-version history.
///
/// The planner reads through this once before a run; the record-version task
/// writes through it inside the run's transaction.
pub trait VersionStore: Send + Sync {
    fn schema_exists(&self, conn: &Connection) -> Result<bool>;

    /// Create the history tables if needed. Safe to call repeatedly.
    fn ensure_schema(&self, conn: &Connection) -> Result<()>;

    /// All recorded versions, ascending.
    fn executed_versions(&self, conn: &Connection) -> Result<Vec<ExecutedVersion>>;

    /// The recorded version with the greatest value.
    fn current_version(&self, conn: &Connection) -> Result<Option<ExecutedVersion>> {
        Ok(self
            .executed_versions(conn)?
            .into_iter()
            .max_by(|a, b| a.version.cmp(&b.version)))
    }

    /// True only if `current` is `target` and already has a task named like `task`.
    fn has_executed_task(
        &self,
        current: Option<&ExecutedVersion>,
        target: &Version,
        task: &dyn Task,
    ) -> bool {
        current
            .filter(|c| &c.version == target)
            .map(|c| c.has_task(task.name()))
            .unwrap_or(false)
    }

    /// Insert or update `record`, adding any tasks that have not been stored yet.
    fn record_version(&self, conn: &Connection, record: &ExecutedVersion) -> Result<()>;
}

/// [`VersionStore`] backed by the `dbroll_version` and `dbroll_task` tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteVersionStore {
    scheme: VersionScheme,
}

impl SqliteVersionStore {
    pub fn new(scheme: VersionScheme) -> Self {
        Self { scheme }
    }

    fn get_tasks(&self, conn: &Connection, version_id: &str) -> Result<Vec<ExecutedTask>> {
        let mut stmt = conn.prepare(
            "SELECT id, updated_at, name, task_order
             FROM dbroll_task WHERE version_id = ? ORDER BY task_order, name",
        )?;

        let tasks = stmt
            .query_map([version_id], |row| {
                Ok(ExecutedTask {
                    id: Some(parse_uuid(row.get::<_, String>(0)?)),
                    updated_at: parse_datetime(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    order: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Id of the stored row whose version equals `version` by value.
    fn find_version_id(&self, conn: &Connection, version: &Version) -> Result<Option<Uuid>> {
        let exact = conn
            .query_row(
                "SELECT id FROM dbroll_version WHERE version = ?",
                [version.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if let Some(id) = exact {
            return Ok(Some(parse_uuid(id)));
        }

        Ok(self
            .executed_versions(conn)?
            .into_iter()
            .find(|v| &v.version == version)
            .and_then(|v| v.id))
    }
}

impl VersionStore for SqliteVersionStore {
    fn schema_exists(&self, conn: &Connection) -> Result<bool> {
        schema::schema_exists(conn)
    }

    fn ensure_schema(&self, conn: &Connection) -> Result<()> {
        schema::ensure_schema(conn)
    }

    fn executed_versions(&self, conn: &Connection) -> Result<Vec<ExecutedVersion>> {
        let mut stmt =
            conn.prepare("SELECT id, version, created_at, updated_at FROM dbroll_version")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut versions = rows
            .into_iter()
            .map(|(id, version, created_at, updated_at)| -> Result<ExecutedVersion> {
                Ok(ExecutedVersion {
                    tasks: self.get_tasks(conn, &id)?,
                    id: Some(parse_uuid(id)),
                    version: self.scheme.parse(&version)?,
                    created_at: parse_datetime(created_at),
                    updated_at: parse_datetime(updated_at),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        versions.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(versions)
    }

    fn record_version(&self, conn: &Connection, record: &ExecutedVersion) -> Result<()> {
        let now = Utc::now();
        let existing_id = match record.id {
            Some(id) => Some(id),
            None => self.find_version_id(conn, &record.version)?,
        };

        let version_id = match existing_id {
            Some(id) => {
                conn.execute(
                    "UPDATE dbroll_version SET updated_at = ? WHERE id = ?",
                    (now.to_rfc3339(), id.to_string()),
                )?;
                id
            }
            None => {
                let id = Uuid::new_v4();
                conn.execute(
                    "INSERT INTO dbroll_version (id, created_at, updated_at, version)
                     VALUES (?, ?, ?, ?)",
                    (
                        id.to_string(),
                        now.to_rfc3339(),
                        now.to_rfc3339(),
                        record.version.as_str(),
                    ),
                )?;
                id
            }
        };

        let stored = self.get_tasks(conn, &version_id.to_string())?;
        let new_tasks = record.tasks.iter().filter(|t| {
            t.id.is_none() && !stored.iter().any(|s| same_task_name(&s.name, &t.name))
        });

        for task in new_tasks {
            conn.execute(
                "INSERT INTO dbroll_task (id, updated_at, name, task_order, version_id)
                 VALUES (?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    now.to_rfc3339(),
                    &task.name,
                    task.order as i64,
                    version_id.to_string(),
                ),
            )?;
        }

        tracing::debug!(
            "Recorded version {} ({} tasks)",
            record.version,
            record.tasks.len()
        );
        Ok(())
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
