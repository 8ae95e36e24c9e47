//! Storage collaborator contract and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::plan::SearchPlan;
use super::ranking::{relevance_order, Ranked};
use crate::db::DbError;
use crate::models::{CodeEntry, UpsertOutcome};

/// Storage errors. Any of these means "cannot answer", never "no matches".
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open storage session: {0}")]
    Session(#[source] DbError),

    #[error("storage query failed: {0}")]
    Query(#[from] DbError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What a backend can accelerate or compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCapabilities {
    /// An n-gram index serves substring and fuzzy candidate lookup
    pub trigram_index: bool,
    /// A similarity function is available to score candidates
    pub similarity: bool,
}

impl StoreCapabilities {
    /// The fuzzy tier needs both a similarity function and an index to keep it off full scans.
    pub fn supports_similarity(&self) -> bool {
        self.trigram_index && self.similarity
    }
}

/// A queryable table of code entries.
pub trait CodeStore: Send + Sync {
    fn capabilities(&self) -> StoreCapabilities;

    fn supports_similarity(&self) -> bool {
        self.capabilities().supports_similarity()
    }

    /// Execute a plan: all qualifying candidates, ordered, then truncated to the plan's limit.
    fn search(&self, plan: &SearchPlan) -> StoreResult<Vec<Ranked<CodeEntry>>>;

    /// Exact, case-sensitive lookup.
    fn find_by_code(&self, code: &str) -> StoreResult<Option<CodeEntry>>;
}

impl<T: CodeStore + ?Sized> CodeStore for Arc<T> {
    fn capabilities(&self) -> StoreCapabilities {
        (**self).capabilities()
    }

    fn search(&self, plan: &SearchPlan) -> StoreResult<Vec<Ranked<CodeEntry>>> {
        (**self).search(plan)
    }

    fn find_by_code(&self, code: &str) -> StoreResult<Option<CodeEntry>> {
        (**self).find_by_code(code)
    }
}

/// Map-backed store for small vocabularies; scans every entry per query.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, CodeEntry>,
    similarity: bool,
}

impl MemoryStore {
    /// Empty store with similarity scoring.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            similarity: true,
        }
    }

    /// Empty store that behaves like a backend with no fuzzy support.
    pub fn without_similarity() -> Self {
        Self {
            entries: BTreeMap::new(),
            similarity: false,
        }
    }

    /// Insert or update by code; a `None` search_terms keeps the stored terms.
    ///
    /// Text is stored in the same cleaned form as the SQLite backend.
    pub fn upsert(&mut self, entry: CodeEntry) -> UpsertOutcome {
        let entry = entry.cleaned();
        match self.entries.get_mut(&entry.code) {
            None => {
                self.entries.insert(entry.code.clone(), entry);
                UpsertOutcome::Inserted
            }
            Some(existing) => {
                let search_terms = entry.search_terms.or_else(|| existing.search_terms.clone());
                if existing.description == entry.description && existing.search_terms == search_terms {
                    return UpsertOutcome::Unchanged;
                }
                existing.description = entry.description;
                existing.search_terms = search_terms;
                UpsertOutcome::Updated
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<CodeEntry> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = CodeEntry>>(iter: I) -> Self {
        let mut store = MemoryStore::new();
        for entry in iter {
            store.upsert(entry);
        }
        store
    }
}

impl CodeStore for MemoryStore {
    fn capabilities(&self) -> StoreCapabilities {
        // A scan over a handful of rows needs no index
        StoreCapabilities {
            trigram_index: self.similarity,
            similarity: self.similarity,
        }
    }

    fn search(&self, plan: &SearchPlan) -> StoreResult<Vec<Ranked<CodeEntry>>> {
        let narrowed;
        let plan = if plan.is_fuzzy() && !self.similarity {
            narrowed = plan.without_fuzzy();
            &narrowed
        } else {
            plan
        };

        let mut ranked: Vec<Ranked<CodeEntry>> = self
            .entries
            .values()
            .filter_map(|entry| {
                plan.rank(
                    Some(&entry.code),
                    &entry.description,
                    entry.search_terms.as_deref(),
                )
                .map(|(tier, score)| Ranked {
                    item: entry.clone(),
                    tier,
                    score,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            relevance_order(a.tier, a.score, b.tier, b.score)
                .then_with(|| a.item.code.cmp(&b.item.code))
        });
        ranked.truncate(plan.limit() as usize);
        Ok(ranked)
    }

    fn find_by_code(&self, code: &str) -> StoreResult<Option<CodeEntry>> {
        Ok(self.entries.get(code).cloned())
    }
}
