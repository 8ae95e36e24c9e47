//! Query planning: normalization, limit clamping and fuzzy-tier activation.

use super::ranking::{
    best_similarity, char_len, classify_entry, contains_normalized, normalize, trigram_keys,
    MatchTier, SimilarityMetric,
};
use crate::config::SearchConfig;

/// The trigram index cannot answer queries shorter than this.
pub const INDEX_MIN_CHARS: usize = 3;

/// Parameters of an active fuzzy tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyPlan {
    pub threshold: f64,
    pub metric: SimilarityMetric,
}

/// A fully resolved search request, independent of the storage backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    query: String,
    limit: u32,
    fuzzy: Option<FuzzyPlan>,
    index_expression: Option<String>,
    index_trigrams: Option<Vec<String>>,
}

impl SearchPlan {
    /// Build a plan; `None` means the query is blank and the answer is an empty list.
    pub fn build(
        raw_query: &str,
        limit: Option<u32>,
        config: &SearchConfig,
        supports_similarity: bool,
    ) -> Option<Self> {
        let query = normalize(raw_query);
        if query.is_empty() {
            return None;
        }

        let chars = char_len(&query);
        let fuzzy = (config.fuzzy_enabled
            && supports_similarity
            && chars >= config.min_fuzzy_chars)
            .then_some(FuzzyPlan {
                threshold: config.fuzzy_threshold,
                metric: config.metric,
            });

        Some(Self::with_candidates(query, config.effective_limit(limit), fuzzy))
    }

    fn with_candidates(query: String, limit: u32, fuzzy: Option<FuzzyPlan>) -> Self {
        // Only trigram similarity is bounded by shared trigrams; other metrics scan
        let indexable = char_len(&query) >= INDEX_MIN_CHARS
            && fuzzy.map_or(true, |f| f.metric == SimilarityMetric::Trigram);
        let index_expression = indexable.then(|| quote_fts(&query));
        let index_trigrams = (indexable && fuzzy.is_some()).then(|| trigram_keys([query.as_str()]));
        Self {
            query,
            limit,
            fuzzy,
            index_expression,
            index_trigrams,
        }
    }

    /// Normalized query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn fuzzy(&self) -> Option<FuzzyPlan> {
        self.fuzzy
    }

    pub fn is_fuzzy(&self) -> bool {
        self.fuzzy.is_some()
    }

    /// FTS5 phrase covering the prefix, substring and key tiers.
    ///
    /// `None` means the candidates cannot be bounded by the index and the store must scan.
    pub fn index_expression(&self) -> Option<&str> {
        self.index_expression.as_deref()
    }

    /// Padded query trigrams; any fuzzy hit shares at least one with the entry.
    pub fn index_trigrams(&self) -> Option<&[String]> {
        self.index_trigrams.as_deref()
    }

    /// Same plan with the fuzzy tier switched off.
    pub fn without_fuzzy(&self) -> Self {
        Self::with_candidates(self.query.clone(), self.limit, None)
    }

    /// Tier and score of one candidate, or `None` if it does not qualify.
    ///
    /// `key` is the vocabulary key that counts as a hit on substring (the ICD-10 code);
    /// key-only hits land in the approximate tier.
    pub fn rank(
        &self,
        key: Option<&str>,
        primary: &str,
        secondary: Option<&str>,
    ) -> Option<(MatchTier, f64)> {
        let score = self
            .fuzzy
            .map(|f| best_similarity(f.metric, primary, secondary, &self.query))
            .unwrap_or(0.0);

        if let Some(tier) = classify_entry(primary, secondary, &self.query) {
            return Some((tier, score));
        }

        let key_hit = key.is_some_and(|k| contains_normalized(k, &self.query));
        let fuzzy_hit = self.fuzzy.is_some_and(|f| score > f.threshold);
        (key_hit || fuzzy_hit).then_some((MatchTier::Approximate, score))
    }
}

fn quote_fts(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}
