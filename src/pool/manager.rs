//! Connection managers: how the pool opens, checks and retires handles.

use crate::{Error, ErrorContext, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Creates and health-checks handles to a backing store.
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new handle. Called lazily, never more than `pool_size` live at once.
    fn connect(&self) -> Result<Self::Connection>;

    /// Cheap liveness probe used when `test_on_checkout` is enabled.
    fn is_valid(&self, conn: &mut Self::Connection) -> Result<()>;

    /// Synchronous check on release; broken handles are discarded.
    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
enum SqliteTarget {
    File(PathBuf),
    SharedMemory(String),
}

/// SQLite handles via `rusqlite`, either to a database file or to a named
/// in-memory database shared by every handle of this manager.
pub struct SqliteManager {
    target: SqliteTarget,
    busy_timeout: Duration,
    init_sql: Option<String>,
    // Keeps a shared in-memory database alive while the pool has no handles.
    anchor: Option<Mutex<Connection>>,
}

impl SqliteManager {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            target: SqliteTarget::File(path.as_ref().to_path_buf()),
            busy_timeout: Duration::from_secs(5),
            init_sql: None,
            anchor: None,
        }
    }

    /// Named in-memory database visible to every handle this manager opens.
    pub fn shared_memory(name: &str) -> Result<Self> {
        let mut manager = Self {
            target: SqliteTarget::SharedMemory(name.to_string()),
            busy_timeout: Duration::from_secs(5),
            init_sql: None,
            anchor: None,
        };
        let anchor = manager.open()?;
        manager.anchor = Some(Mutex::new(anchor));
        Ok(manager)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// SQL run on every new handle (schema creation, pragmas).
    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql = Some(sql.into());
        self
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.target {
            SqliteTarget::File(p) => Some(p),
            SqliteTarget::SharedMemory(_) => None,
        }
    }

    fn open(&self) -> Result<Connection> {
        let conn = match &self.target {
            SqliteTarget::File(path) => Connection::open(path),
            SqliteTarget::SharedMemory(name) => Connection::open_with_flags(
                format!("file:{}?mode=memory&cache=shared", name),
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        }
        .map_err(|e| {
            Error::store_with_context(
                e.to_string(),
                ErrorContext::new()
                    .with_source("sqlite_manager")
                    .with_details(format!("open {:?}", self.target)),
            )
        })?;
        self.apply_pragmas(&conn)?;
        Ok(conn)
    }

    fn apply_pragmas(&self, conn: &Connection) -> Result<()> {
        conn.busy_timeout(self.busy_timeout)?;
        if let SqliteTarget::File(_) = self.target {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }
}

impl ConnectionManager for SqliteManager {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection> {
        let conn = self.open()?;
        if let Some(sql) = &self.init_sql {
            conn.execute_batch(sql)?;
        }
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<()> {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
