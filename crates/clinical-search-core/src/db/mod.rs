//! Database layer for clinical-search.

mod drugs;
mod functions;
mod icd10;
mod index;
mod schema;
mod seed_runs;
mod store;
mod tiered;

pub use icd10::*;
pub use schema::*;
pub use seed_runs::*;
pub use store::*;

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::search::{SearchPlan, StoreCapabilities};

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Where a database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSource {
    File(PathBuf),
    /// Named in-memory database shared by every connection in this process
    SharedMemory(String),
}

impl DatabaseSource {
    /// A shared in-memory database with a process-unique name.
    pub fn unique_memory() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        DatabaseSource::SharedMemory(format!("clinical-search-{}-{}", std::process::id(), n))
    }

    fn open_connection(&self, create: bool) -> rusqlite::Result<Connection> {
        let mut flags =
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            DatabaseSource::File(path) => {
                if create {
                    flags |= OpenFlags::SQLITE_OPEN_CREATE;
                }
                Connection::open_with_flags(path, flags)
            }
            DatabaseSource::SharedMemory(name) => {
                let uri = format!("file:{}?mode=memory&cache=shared", name);
                Connection::open_with_flags(uri, flags | OpenFlags::SQLITE_OPEN_CREATE)
            }
        }
    }
}

impl fmt::Display for DatabaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseSource::File(path) => write!(f, "{}", path.display()),
            DatabaseSource::SharedMemory(name) => write!(f, "memory:{}", name),
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Register the similarity SQL function (disable to model a backend without fuzzy support)
    pub similarity: bool,
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            similarity: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
    similarity: bool,
    search_index: bool,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with(
            &DatabaseSource::File(path.as_ref().to_path_buf()),
            DatabaseOptions::default(),
        )
    }

    /// Create a private in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self::configure(conn, DatabaseOptions::default())?;
        db.initialize()?;
        Ok(db)
    }

    /// Open (creating if needed) and initialize the schema.
    pub fn open_with(source: &DatabaseSource, options: DatabaseOptions) -> DbResult<Self> {
        let conn = source.open_connection(true)?;
        if let DatabaseSource::File(_) = source {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(%source, journal_mode = %mode, "opened database");
        }
        let mut db = Self::configure(conn, options)?;
        db.initialize()?;
        Ok(db)
    }

    /// Open a session on an existing, initialized database.
    pub fn connect(source: &DatabaseSource, options: DatabaseOptions) -> DbResult<Self> {
        let conn = source.open_connection(false)?;
        let mut db = Self::configure(conn, options)?;
        db.search_index = db.has_search_index()?;
        Ok(db)
    }

    fn configure(conn: Connection, options: DatabaseOptions) -> DbResult<Self> {
        conn.busy_timeout(options.busy_timeout)?;
        functions::register(&conn, options.similarity)?;
        Ok(Self {
            conn,
            similarity: options.similarity,
            search_index: false,
        })
    }

    /// Initialize schema. The trigram index is optional: if this SQLite build
    /// cannot create it, searches fall back to scanning.
    fn initialize(&mut self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;

        let existed = self.has_search_index()?;
        let tx = self.conn.unchecked_transaction()?;
        match tx.execute_batch(SEARCH_INDEX_SCHEMA) {
            Ok(()) => tx.commit()?,
            Err(e) => {
                drop(tx);
                tracing::warn!(error = %e, "trigram search index unavailable, searches will scan");
            }
        }

        self.search_index = self.has_search_index()?;
        if self.search_index && !existed {
            self.rebuild_search_index()?;
        }
        Ok(())
    }

    /// Whether a table (or virtual table) exists.
    pub fn has_table(&self, name: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn has_search_index(&self) -> DbResult<bool> {
        let postings = TRIGRAM_POSTINGS.iter().map(|(table, _)| *table);
        for table in SEARCH_INDEX_TABLES.into_iter().chain(postings) {
            if !self.has_table(table)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// What this session can accelerate or compute.
    pub fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            trigram_index: self.search_index,
            similarity: self.similarity,
        }
    }

    /// Drop the fuzzy tier from plans this session cannot execute.
    pub(crate) fn effective_plan<'a>(&self, plan: &'a SearchPlan) -> Cow<'a, SearchPlan> {
        if plan.is_fuzzy() && !self.capabilities().supports_similarity() {
            tracing::debug!(query = plan.query(), "session lacks similarity support, fuzzy tier disabled");
            Cow::Owned(plan.without_fuzzy())
        } else {
            Cow::Borrowed(plan)
        }
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }
}
