//! Process configuration, resolved once at startup.

use std::path::PathBuf;

use clinical_search_core::{ConfigError, SearchConfig, SimilarityMetric};
use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = "clinical_search.db";
pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid search configuration: {0}")]
    Search(#[from] ConfigError),
}

/// Everything the server and CLI need to start.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub db_path: PathBuf,
    pub addr: String,
    pub icd10: SearchConfig,
    pub drugs: SearchConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            addr: DEFAULT_ADDR.to_string(),
            icd10: SearchConfig::icd10(),
            drugs: SearchConfig::drugs(),
        }
    }
}

impl ApiConfig {
    /// Read configuration from the process environment.
    ///
    /// # Environment Variables
    /// - `CLINICAL_SEARCH_DB`: SQLite database path (default: "clinical_search.db")
    /// - `CLINICAL_SEARCH_ADDR`: Server address (default: "0.0.0.0:3000")
    /// - `CLINICAL_SEARCH_FUZZY`: Enable the fuzzy tier (default: true)
    /// - `CLINICAL_SEARCH_FUZZY_THRESHOLD`: Similarity a fuzzy match must exceed (default: 0.2)
    /// - `CLINICAL_SEARCH_FUZZY_MIN_CHARS`: Shortest query that gets fuzzy matching (default: 3)
    /// - `CLINICAL_SEARCH_METRIC`: `trigram`, `jaro_winkler` or `levenshtein` (default: trigram)
    pub fn from_env() -> Result<Self, ApiConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ApiConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ApiConfig::default();

        if let Some(path) = lookup("CLINICAL_SEARCH_DB") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup("CLINICAL_SEARCH_ADDR") {
            config.addr = addr;
        }
        if let Some(value) = lookup("CLINICAL_SEARCH_FUZZY") {
            let enabled = parse_bool("CLINICAL_SEARCH_FUZZY", &value)?;
            config.apply_search(|c| c.with_fuzzy(enabled));
        }
        if let Some(value) = lookup("CLINICAL_SEARCH_FUZZY_THRESHOLD") {
            let threshold: f64 = value.trim().parse().map_err(|e: std::num::ParseFloatError| {
                invalid("CLINICAL_SEARCH_FUZZY_THRESHOLD", &value, e.to_string())
            })?;
            config.apply_search(|c| c.with_threshold(threshold));
        }
        if let Some(value) = lookup("CLINICAL_SEARCH_FUZZY_MIN_CHARS") {
            let chars: usize = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                invalid("CLINICAL_SEARCH_FUZZY_MIN_CHARS", &value, e.to_string())
            })?;
            config.apply_search(|c| c.with_min_fuzzy_chars(chars));
        }
        if let Some(value) = lookup("CLINICAL_SEARCH_METRIC") {
            let metric: SimilarityMetric = value
                .parse()
                .map_err(|e: String| invalid("CLINICAL_SEARCH_METRIC", &value, e))?;
            config.apply_search(|c| c.with_metric(metric));
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply the same search tuning to every vocabulary.
    pub fn apply_search<F>(&mut self, f: F)
    where
        F: Fn(SearchConfig) -> SearchConfig,
    {
        self.icd10 = f(self.icd10.clone());
        self.drugs = f(self.drugs.clone());
    }

    pub fn validate(&self) -> Result<(), ApiConfigError> {
        self.icd10.validate()?;
        self.drugs.validate()?;
        Ok(())
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ApiConfigError {
    ApiConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ApiConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "expected a boolean")),
    }
}
