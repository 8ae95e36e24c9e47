//! Search tuning parameters.
//!
//! The fuzzy acceptance threshold and the minimum query length for the fuzzy tier are tuned
//! values rather than derived ones, so they live here instead of inside the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::SimilarityMetric;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max_limit must be at least 1")]
    ZeroMaxLimit,

    #[error("default_limit ({default}) must be between 1 and max_limit ({max})")]
    DefaultLimitOutOfRange { default: u32, max: u32 },

    #[error("fuzzy_threshold must be in [0, 1), got {0}")]
    ThresholdOutOfRange(f64),

    #[error("min_fuzzy_chars must be at least 1")]
    ZeroMinFuzzyChars,
}

/// Ranking and bounding parameters for one vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result count used when the caller gives none (or zero)
    pub default_limit: u32,
    /// Hard cap; larger requests are clamped, never rejected
    pub max_limit: u32,
    /// Master switch for the fuzzy tier
    pub fuzzy_enabled: bool,
    /// Shorter queries produce too much similarity noise and skip the fuzzy tier
    pub min_fuzzy_chars: usize,
    /// A candidate must score strictly above this to qualify for the fuzzy tier
    pub fuzzy_threshold: f64,
    /// Similarity function used for the fuzzy tier and as secondary sort key
    pub metric: SimilarityMetric,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::icd10()
    }
}

impl SearchConfig {
    /// Defaults for diagnosis lookup.
    pub fn icd10() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            fuzzy_enabled: true,
            min_fuzzy_chars: 3,
            fuzzy_threshold: 0.2,
            metric: SimilarityMetric::Trigram,
        }
    }

    /// Defaults for drug-name autocomplete.
    pub fn drugs() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
            ..Self::icd10()
        }
    }

    pub fn with_limits(mut self, default_limit: u32, max_limit: u32) -> Self {
        self.default_limit = default_limit;
        self.max_limit = max_limit;
        self
    }

    pub fn with_fuzzy(mut self, enabled: bool) -> Self {
        self.fuzzy_enabled = enabled;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_min_fuzzy_chars(mut self, chars: usize) -> Self {
        self.min_fuzzy_chars = chars;
        self
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Check invariants between fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError::ZeroMaxLimit);
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::DefaultLimitOutOfRange {
                default: self.default_limit,
                max: self.max_limit,
            });
        }
        if !(0.0..1.0).contains(&self.fuzzy_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.fuzzy_threshold));
        }
        if self.min_fuzzy_chars == 0 {
            return Err(ConfigError::ZeroMinFuzzyChars);
        }
        Ok(())
    }

    /// Resolve a caller-supplied limit: absent or zero means default, oversized is clamped.
    pub fn effective_limit(&self, requested: Option<u32>) -> u32 {
        match requested {
            None | Some(0) => self.default_limit,
            Some(n) => n.min(self.max_limit),
        }
    }
}
