//! Session-per-operation SQLite store.

use std::path::Path;
use std::sync::Mutex;

use super::{Database, DatabaseOptions, DatabaseSource, DbResult};
use crate::models::CodeEntry;
use crate::search::{CodeStore, Ranked, SearchPlan, StoreCapabilities, StoreError, StoreResult};

/// A [`CodeStore`] that opens a fresh [`Database`] session for every operation,
/// so concurrent callers never share a connection.
pub struct SqliteStore {
    source: DatabaseSource,
    options: DatabaseOptions,
    capabilities: StoreCapabilities,
    /// Keeps a shared in-memory database alive between sessions
    _anchor: Option<Mutex<Database>>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with(
            DatabaseSource::File(path.as_ref().to_path_buf()),
            DatabaseOptions::default(),
        )
    }

    /// A fresh, process-private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_with(DatabaseSource::unique_memory(), DatabaseOptions::default())
    }

    /// Initialize the schema once, then serve sessions from `source`.
    pub fn open_with(source: DatabaseSource, options: DatabaseOptions) -> DbResult<Self> {
        let db = Database::open_with(&source, options)?;
        let capabilities = db.capabilities();
        tracing::info!(
            %source,
            trigram_index = capabilities.trigram_index,
            similarity = capabilities.similarity,
            "search store opened"
        );

        let anchor = match source {
            DatabaseSource::SharedMemory(_) => Some(Mutex::new(db)),
            DatabaseSource::File(_) => None,
        };
        Ok(Self {
            source,
            options,
            capabilities,
            _anchor: anchor,
        })
    }

    pub fn source(&self) -> &DatabaseSource {
        &self.source
    }

    /// Open a new session.
    pub fn session(&self) -> StoreResult<Database> {
        Database::connect(&self.source, self.options).map_err(StoreError::Session)
    }

    /// Run `f` on a new session.
    pub fn with_session<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Database) -> DbResult<T>,
    {
        let mut db = self.session()?;
        Ok(f(&mut db)?)
    }
}

impl CodeStore for SqliteStore {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn search(&self, plan: &SearchPlan) -> StoreResult<Vec<Ranked<CodeEntry>>> {
        self.with_session(|db| db.search_code_entries(plan))
    }

    fn find_by_code(&self, code: &str) -> StoreResult<Option<CodeEntry>> {
        self.with_session(|db| db.get_code_entry(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::models::UpsertOutcome;

    #[test]
    fn test_in_memory_stores_are_isolated() {
        let a = SqliteStore::open_in_memory().unwrap();
        let b = SqliteStore::open_in_memory().unwrap();

        a.with_session(|db| db.upsert_code_entry(&CodeEntry::new("J45", "Asma")))
            .unwrap();

        assert!(a.find_by_code("J45").unwrap().is_some());
        assert!(b.find_by_code("J45").unwrap().is_none());
    }

    #[test]
    fn test_search_through_sessions() {
        let store = SqliteStore::open_in_memory().unwrap();
        let outcome = store
            .with_session(|db| db.upsert_code_entry(&CodeEntry::new("E11", "Diabetes mellitus tipo 2")))
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let plan = SearchPlan::build("diab", None, &SearchConfig::icd10(), store.supports_similarity())
            .unwrap();
        let results = store.search(&plan).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.code, "E11");
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icd10.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.capabilities().supports_similarity());

        store
            .with_session(|db| db.upsert_code_entry(&CodeEntry::new("J45", "Asma")))
            .unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened.find_by_code("J45").unwrap().is_some());
    }

    #[test]
    fn test_session_failure_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.db");
        let store = SqliteStore::open(&path).unwrap();
        drop(dir);

        let result = store.find_by_code("J45");
        assert!(matches!(result, Err(StoreError::Session(_))));
    }
}
