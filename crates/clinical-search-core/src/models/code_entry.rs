//! ICD-10 code entry models.

use serde::{Deserialize, Serialize};

use crate::search::collapse_whitespace;

/// A single coded term in the diagnosis vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeEntry {
    /// Short alphanumeric identifier (e.g., "E10") - unique, immutable
    pub code: String,
    /// Canonical human-readable description
    pub description: String,
    /// Clinician-curated synonyms, abbreviations and informal phrasing
    pub search_terms: Option<String>,
}

/// The projection returned to search callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeSummary {
    pub code: String,
    pub description: String,
}

/// What an idempotent upsert-by-code did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl CodeEntry {
    /// Create a new entry without curated search terms.
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            search_terms: None,
        }
    }

    /// Attach curated search terms.
    pub fn with_search_terms(mut self, terms: impl Into<String>) -> Self {
        self.search_terms = Some(terms.into());
        self
    }

    /// Copy in stored form: trimmed code, single-spaced text, blank terms as `None`.
    pub fn cleaned(&self) -> CodeEntry {
        CodeEntry {
            code: self.code.trim().to_string(),
            description: collapse_whitespace(&self.description),
            search_terms: self
                .search_terms
                .as_deref()
                .map(collapse_whitespace)
                .filter(|t| !t.is_empty()),
        }
    }

    /// Public projection of this entry.
    pub fn summary(&self) -> CodeSummary {
        CodeSummary {
            code: self.code.clone(),
            description: self.description.clone(),
        }
    }
}

impl From<CodeEntry> for CodeSummary {
    fn from(entry: CodeEntry) -> Self {
        Self {
            code: entry.code,
            description: entry.description,
        }
    }
}
