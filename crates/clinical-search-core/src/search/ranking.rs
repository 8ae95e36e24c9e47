//! Relevance tiers and similarity scoring.
//!
//! Ranking follows clinical autocomplete expectations:
//! - Tier 0: the text starts with the query
//! - Tier 1: the text contains the query elsewhere
//! - Tier 2: everything else that still qualifies (fuzzy similarity above threshold, or a code hit)
//!
//! Within a tier, higher similarity wins; remaining ties fall back to the vocabulary key.
//! Every storage backend goes through these functions (SQLite registers them as SQL
//! functions), so tier semantics cannot drift between backends.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};

/// Relevance class of a candidate; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Prefix = 0,
    Substring = 1,
    Approximate = 2,
}

impl MatchTier {
    /// Numeric rank as stored/compared in SQL.
    pub fn rank(self) -> i64 {
        self as i64
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            0 => Some(MatchTier::Prefix),
            1 => Some(MatchTier::Substring),
            2 => Some(MatchTier::Approximate),
            _ => None,
        }
    }
}

/// A candidate with its tier and similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub tier: MatchTier,
    /// Similarity in [0, 1]; 0.0 when the fuzzy tier is inactive
    pub score: f64,
}

/// Similarity function backing the fuzzy tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Word trigram overlap (Jaccard), pg_trgm compatible
    #[default]
    Trigram,
    /// Jaro-Winkler over the normalized strings
    JaroWinkler,
    /// 1 - edit distance / max length
    NormalizedLevenshtein,
}

impl SimilarityMetric {
    /// Stable identifier passed into SQL.
    pub fn id(self) -> i64 {
        match self {
            SimilarityMetric::Trigram => 0,
            SimilarityMetric::JaroWinkler => 1,
            SimilarityMetric::NormalizedLevenshtein => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(SimilarityMetric::Trigram),
            1 => Some(SimilarityMetric::JaroWinkler),
            2 => Some(SimilarityMetric::NormalizedLevenshtein),
            _ => None,
        }
    }

    /// Score `text` against an already-normalized query.
    pub fn score(self, text: &str, query: &str) -> f64 {
        let text = normalize(text);
        match self {
            SimilarityMetric::Trigram => trigram_similarity(&text, query),
            SimilarityMetric::JaroWinkler => jaro_winkler(&text, query),
            SimilarityMetric::NormalizedLevenshtein => normalized_levenshtein(&text, query),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMetric::Trigram => "trigram",
            SimilarityMetric::JaroWinkler => "jaro_winkler",
            SimilarityMetric::NormalizedLevenshtein => "normalized_levenshtein",
        };
        f.write_str(name)
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "trigram" | "pg_trgm" => Ok(SimilarityMetric::Trigram),
            "jaro_winkler" => Ok(SimilarityMetric::JaroWinkler),
            "levenshtein" | "normalized_levenshtein" => Ok(SimilarityMetric::NormalizedLevenshtein),
            other => Err(format!("unknown similarity metric: {}", other)),
        }
    }
}

/// Trim and collapse whitespace runs to one space, keeping case.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim, collapse whitespace runs and lowercase.
pub fn normalize(text: &str) -> String {
    collapse_whitespace(text).to_lowercase()
}

/// Length in characters, which is what the length thresholds count.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Tier of a single text field against a normalized query.
pub fn classify_field(field: &str, query: &str) -> Option<MatchTier> {
    let field = normalize(field);
    if field.starts_with(query) {
        Some(MatchTier::Prefix)
    } else if field.contains(query) {
        Some(MatchTier::Substring)
    } else {
        None
    }
}

/// Best tier across the primary text and the optional curated terms.
pub fn classify_entry(primary: &str, secondary: Option<&str>, query: &str) -> Option<MatchTier> {
    let primary_tier = classify_field(primary, query);
    let secondary_tier = secondary.and_then(|s| classify_field(s, query));
    match (primary_tier, secondary_tier) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Case-insensitive substring test used for code hits.
pub fn contains_normalized(text: &str, query: &str) -> bool {
    normalize(text).contains(query)
}

/// Best similarity across the primary text and the optional curated terms.
pub fn best_similarity(
    metric: SimilarityMetric,
    primary: &str,
    secondary: Option<&str>,
    query: &str,
) -> f64 {
    let primary_score = metric.score(primary, query);
    let secondary_score = secondary.map(|s| metric.score(s, query)).unwrap_or(0.0);
    primary_score.max(secondary_score)
}

/// Ordering between two candidates before the key tiebreak: tier ascending, score descending.
pub fn relevance_order(a_tier: MatchTier, a_score: f64, b_tier: MatchTier, b_score: f64) -> Ordering {
    a_tier
        .cmp(&b_tier)
        .then_with(|| b_score.partial_cmp(&a_score).unwrap_or(Ordering::Equal))
}

/// Word trigrams: alphanumeric runs, lowercased, padded with two leading blanks and one trailing.
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// Jaccard overlap of the two strings' trigram sets.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let common = left.intersection(&right).count();
    let union = left.len() + right.len() - common;
    common as f64 / union as f64
}

/// Sorted union of the padded trigrams of several texts.
///
/// A trigram similarity above zero needs at least one shared key, so these are
/// the postings stored per entry and the keys looked up per fuzzy query.
pub fn trigram_keys<'a, I>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<String> = texts
        .into_iter()
        .flat_map(trigrams)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    keys.sort();
    keys
}
