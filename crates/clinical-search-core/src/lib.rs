//! Clinical Search Core Library
//!
//! Tiered, typo-tolerant lookup over coded medical vocabularies (ICD-10
//! diagnoses and a drug library), backed by SQLite with a trigram index.
//!
//! # Ranking
//!
//! ```text
//!   query "diabetes"
//!        │
//!        ▼
//!   ┌─────────────┐   tier 0: text starts with the query
//!   │  SearchPlan │   tier 1: text contains the query
//!   └──────┬──────┘   tier 2: similarity > threshold, or code contains the query
//!          │
//!          ▼
//!   candidates (trigram index) ─► tier ASC, similarity DESC, code ASC ─► LIMIT
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite storage, trigram index lifecycle, session-per-operation store
//! - [`search`]: ranking primitives, query planning, search engine, drug catalog
//! - [`seed`]: bulk CSV import with run bookkeeping
//! - [`config`]: search tuning parameters
//! - [`models`]: domain types (CodeEntry, Drug, etc.)

pub mod config;
pub mod db;
pub mod models;
pub mod search;
pub mod seed;

// Re-export commonly used types
pub use config::{ConfigError, SearchConfig};
pub use db::{Database, DatabaseOptions, DatabaseSource, DbError, SeedReport, SqliteStore};
pub use models::{CodeEntry, CodeSummary, Drug, NewDrug, UpsertOutcome};
pub use search::{
    CodeStore, DrugCatalog, MatchTier, MemoryStore, SearchEngine, SearchError, SimilarityMetric,
    StoreCapabilities, StoreError, TieredSearchEngine,
};
pub use seed::{CsvSeeder, SeedError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicalSearchError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Search engine unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Seed error: {0}")]
    SeedError(String),
}

impl From<DbError> for ClinicalSearchError {
    fn from(e: DbError) -> Self {
        ClinicalSearchError::DatabaseError(e.to_string())
    }
}

impl From<StoreError> for ClinicalSearchError {
    fn from(e: StoreError) -> Self {
        ClinicalSearchError::Unavailable(e.to_string())
    }
}

impl From<SearchError> for ClinicalSearchError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Unavailable(e) => e.into(),
            SearchError::InvalidInput(msg) => ClinicalSearchError::InvalidInput(msg),
        }
    }
}

impl From<SeedError> for ClinicalSearchError {
    fn from(e: SeedError) -> Self {
        match e {
            SeedError::Database(e) => e.into(),
            other => ClinicalSearchError::SeedError(other.to_string()),
        }
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a search database at the given path.
#[uniffi::export]
pub fn open_search_engine(path: String) -> Result<Arc<ClinicalSearchCore>, ClinicalSearchError> {
    let store = SqliteStore::open(&path)?;
    Ok(Arc::new(ClinicalSearchCore::new(Arc::new(store))))
}

/// Create an in-memory search database (for testing).
#[uniffi::export]
pub fn open_search_engine_in_memory() -> Result<Arc<ClinicalSearchCore>, ClinicalSearchError> {
    let store = SqliteStore::open_in_memory()?;
    Ok(Arc::new(ClinicalSearchCore::new(Arc::new(store))))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe search handle for FFI.
#[derive(uniffi::Object)]
pub struct ClinicalSearchCore {
    store: Arc<SqliteStore>,
    icd10: TieredSearchEngine<Arc<SqliteStore>>,
    drugs: DrugCatalog,
}

impl ClinicalSearchCore {
    fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            icd10: TieredSearchEngine::new(Arc::clone(&store)),
            drugs: DrugCatalog::new(Arc::clone(&store)),
            store,
        }
    }
}

#[uniffi::export]
impl ClinicalSearchCore {
    // =========================================================================
    // ICD-10 Operations
    // =========================================================================

    /// Ranked diagnosis search; `None` limit means the default (20).
    pub fn search_icd10(
        &self,
        query: String,
        limit: Option<u32>,
    ) -> Result<Vec<FfiCodeSummary>, ClinicalSearchError> {
        let results = self.icd10.search(&query, limit)?;
        Ok(results.into_iter().map(|s| s.into()).collect())
    }

    /// Exact lookup by code.
    pub fn get_icd10(&self, code: String) -> Result<Option<FfiCodeEntry>, ClinicalSearchError> {
        let entry = self.icd10.get_by_code(&code)?;
        Ok(entry.map(|e| e.into()))
    }

    /// Add or update a code entry.
    pub fn upsert_icd10(&self, entry: FfiCodeEntry) -> Result<FfiUpsertOutcome, ClinicalSearchError> {
        let entry: CodeEntry = entry.into();
        let db = self.store.session()?;
        let outcome = db.upsert_code_entry(&entry)?;
        Ok(outcome.into())
    }

    /// Import a CSV file of codes.
    pub fn seed_icd10_csv(&self, path: String) -> Result<FfiSeedReport, ClinicalSearchError> {
        let mut db = self.store.session()?;
        let report = CsvSeeder::new().seed_file(&mut db, &path)?;
        Ok(report.into())
    }

    // =========================================================================
    // Drug Operations
    // =========================================================================

    /// Ranked drug-name search; `None` limit means the default (10).
    pub fn search_drugs(
        &self,
        query: String,
        limit: Option<u32>,
    ) -> Result<Vec<FfiDrug>, ClinicalSearchError> {
        let drugs = self.drugs.search(&query, limit)?;
        Ok(drugs.into_iter().map(|d| d.into()).collect())
    }

    /// Add a drug to the library.
    pub fn create_drug(
        &self,
        name: String,
        presentation: Option<String>,
        strength: Option<String>,
    ) -> Result<FfiDrug, ClinicalSearchError> {
        let drug = self.drugs.create(&NewDrug {
            name,
            presentation,
            strength,
        })?;
        Ok(drug.into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe code entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCodeEntry {
    pub code: String,
    pub description: String,
    pub search_terms: Option<String>,
}

impl From<CodeEntry> for FfiCodeEntry {
    fn from(entry: CodeEntry) -> Self {
        Self {
            code: entry.code,
            description: entry.description,
            search_terms: entry.search_terms,
        }
    }
}

impl From<FfiCodeEntry> for CodeEntry {
    fn from(entry: FfiCodeEntry) -> Self {
        CodeEntry {
            code: entry.code,
            description: entry.description,
            search_terms: entry.search_terms,
        }
    }
}

/// FFI-safe search result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCodeSummary {
    pub code: String,
    pub description: String,
}

impl From<CodeSummary> for FfiCodeSummary {
    fn from(summary: CodeSummary) -> Self {
        Self {
            code: summary.code,
            description: summary.description,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiUpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl From<UpsertOutcome> for FfiUpsertOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => FfiUpsertOutcome::Inserted,
            UpsertOutcome::Updated => FfiUpsertOutcome::Updated,
            UpsertOutcome::Unchanged => FfiUpsertOutcome::Unchanged,
        }
    }
}

/// FFI-safe drug.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDrug {
    pub id: i64,
    pub name: String,
    pub presentation: Option<String>,
    pub strength: Option<String>,
    pub created_at: String,
}

impl From<Drug> for FfiDrug {
    fn from(drug: Drug) -> Self {
        Self {
            id: drug.id,
            name: drug.name,
            presentation: drug.presentation,
            strength: drug.strength,
            created_at: drug.created_at,
        }
    }
}

/// FFI-safe seed report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSeedReport {
    pub run_id: String,
    pub source: String,
    pub source_sha256: String,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub started_at: String,
    pub finished_at: String,
}

impl From<SeedReport> for FfiSeedReport {
    fn from(report: SeedReport) -> Self {
        Self {
            run_id: report.run_id.to_string(),
            source: report.source,
            source_sha256: report.source_sha256,
            inserted: report.inserted,
            updated: report.updated,
            unchanged: report.unchanged,
            skipped: report.skipped,
            started_at: report.started_at.to_rfc3339(),
            finished_at: report.finished_at.to_rfc3339(),
        }
    }
}
