//! Tiered clinical text search.
//!
//! # Pipeline
//!
//! ```text
//! raw query ─► SearchPlan::build ─► CodeStore::search ─► CodeSummary list
//!              (normalize, clamp      (candidates, tier,
//!               limit, fuzzy gate)     score, sort, limit)
//! ```
//!
//! An empty normalized query never reaches storage. Storage failures surface as
//! [`SearchError::Unavailable`] and are never reported as an empty result.

mod drugs;
mod plan;
mod ranking;
mod store;

pub use drugs::*;
pub use plan::*;
pub use ranking::*;
pub use store::*;

use thiserror::Error;

use crate::config::{ConfigError, SearchConfig};
use crate::models::{CodeEntry, CodeSummary};

/// Search errors.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search engine unavailable: {0}")]
    Unavailable(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type SearchResult<T> = Result<T, SearchError>;

/// Lookup over a coded vocabulary.
pub trait SearchEngine: Send + Sync {
    /// Ranked matches for free text, at most `limit` (clamped) of them.
    fn search(&self, query: &str, limit: Option<u32>) -> SearchResult<Vec<CodeSummary>>;

    /// Exact lookup by code.
    fn get_by_code(&self, code: &str) -> SearchResult<Option<CodeEntry>>;
}

/// Prefix, substring, then fuzzy matches over any [`CodeStore`].
pub struct TieredSearchEngine<S> {
    store: S,
    config: SearchConfig,
}

impl<S: CodeStore> TieredSearchEngine<S> {
    /// Engine with the ICD-10 defaults.
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: SearchConfig::icd10(),
        }
    }

    pub fn with_config(store: S, config: SearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Resolve a request against this engine's config and store capabilities.
    pub fn plan(&self, query: &str, limit: Option<u32>) -> Option<SearchPlan> {
        let supports_similarity = self.store.supports_similarity();
        let plan = SearchPlan::build(query, limit, &self.config, supports_similarity)?;

        if self.config.fuzzy_enabled && !supports_similarity {
            tracing::debug!(query = plan.query(), "store lacks similarity support, fuzzy tier disabled");
        }
        tracing::debug!(
            query = plan.query(),
            limit = plan.limit(),
            fuzzy = plan.is_fuzzy(),
            "search plan"
        );
        Some(plan)
    }

    /// Like [`SearchEngine::search`], keeping tiers and scores.
    pub fn search_ranked(
        &self,
        query: &str,
        limit: Option<u32>,
    ) -> SearchResult<Vec<Ranked<CodeEntry>>> {
        let Some(plan) = self.plan(query, limit) else {
            return Ok(Vec::new());
        };

        self.store.search(&plan).map_err(|e| {
            tracing::error!(error = %e, query = plan.query(), "search failed");
            SearchError::from(e)
        })
    }
}

impl<S: CodeStore> SearchEngine for TieredSearchEngine<S> {
    fn search(&self, query: &str, limit: Option<u32>) -> SearchResult<Vec<CodeSummary>> {
        Ok(self
            .search_ranked(query, limit)?
            .into_iter()
            .map(|ranked| ranked.item.into())
            .collect())
    }

    fn get_by_code(&self, code: &str) -> SearchResult<Option<CodeEntry>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }

        self.store.find_by_code(code).map_err(|e| {
            tracing::error!(error = %e, code, "lookup failed");
            SearchError::from(e)
        })
    }
}
