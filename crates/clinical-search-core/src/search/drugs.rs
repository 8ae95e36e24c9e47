//! Drug-name lookup, ranked like diagnosis search.

use std::sync::Arc;

use super::{Ranked, SearchError, SearchPlan, SearchResult};
use crate::config::{ConfigError, SearchConfig};
use crate::db::SqliteStore;
use crate::models::{Drug, NewDrug};
use crate::search::CodeStore;

/// The prescribing library.
pub struct DrugCatalog {
    store: Arc<SqliteStore>,
    config: SearchConfig,
}

impl DrugCatalog {
    /// Catalog with the drug search defaults.
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            config: SearchConfig::drugs(),
        }
    }

    pub fn with_config(store: Arc<SqliteStore>, config: SearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn search(&self, query: &str, limit: Option<u32>) -> SearchResult<Vec<Drug>> {
        Ok(self
            .search_ranked(query, limit)?
            .into_iter()
            .map(|ranked| ranked.item)
            .collect())
    }

    pub fn search_ranked(&self, query: &str, limit: Option<u32>) -> SearchResult<Vec<Ranked<Drug>>> {
        let Some(plan) = SearchPlan::build(query, limit, &self.config, self.store.supports_similarity())
        else {
            return Ok(Vec::new());
        };
        tracing::debug!(query = plan.query(), limit = plan.limit(), fuzzy = plan.is_fuzzy(), "drug search plan");

        self.store
            .with_session(|db| db.search_drugs(&plan))
            .map_err(|e| {
                tracing::error!(error = %e, query = plan.query(), "drug search failed");
                SearchError::from(e)
            })
    }

    pub fn get(&self, id: i64) -> SearchResult<Option<Drug>> {
        Ok(self.store.with_session(|db| db.get_drug(id))?)
    }

    /// Add a drug to the library.
    pub fn create(&self, drug: &NewDrug) -> SearchResult<Drug> {
        let Some(drug) = drug.cleaned() else {
            return Err(SearchError::InvalidInput("drug name must not be empty".to_string()));
        };

        let created = self.store.with_session(|db| db.insert_drug(&drug)).map_err(|e| {
            tracing::error!(error = %e, name = %drug.name, "drug insert failed");
            SearchError::from(e)
        })?;
        tracing::info!(id = created.id, name = %created.name, "drug created");
        Ok(created)
    }
}
