//! Ranking primitives exposed to SQL as scalar functions.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::search::{classify_entry, contains_normalized, trigram_keys, MatchTier, SimilarityMetric};

/// Register the ranking functions on a connection.
///
/// - `clinical_tier(query, primary, secondary)` -> 0 prefix, 1 substring, 2 neither
/// - `clinical_contains(text, query)` -> 1 if `text` contains `query` (case-insensitive)
/// - `clinical_similarity(text, query, metric_id)` -> REAL, NULL for NULL text
/// - `clinical_trigrams(text, ...)` -> JSON array of the padded trigrams of every non-NULL argument
///
/// `clinical_similarity` is only registered when `similarity` is set, so a session
/// without it models a backend that has no fuzzy support.
pub(crate) fn register(conn: &Connection, similarity: bool) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("clinical_tier", 3, flags, |ctx| {
        let query: String = ctx.get(0)?;
        let primary: Option<String> = ctx.get(1)?;
        let secondary: Option<String> = ctx.get(2)?;
        let tier = classify_entry(
            primary.as_deref().unwrap_or_default(),
            secondary.as_deref(),
            &query,
        );
        Ok(tier.unwrap_or(MatchTier::Approximate).rank())
    })?;

    conn.create_scalar_function("clinical_contains", 2, flags, |ctx| {
        let text: Option<String> = ctx.get(0)?;
        let query: String = ctx.get(1)?;
        Ok(text.is_some_and(|t| contains_normalized(&t, &query)))
    })?;

    conn.create_scalar_function("clinical_trigrams", -1, flags, |ctx| {
        let mut texts = Vec::with_capacity(ctx.len());
        for i in 0..ctx.len() {
            let text: Option<String> = ctx.get(i)?;
            texts.extend(text);
        }
        let keys = trigram_keys(texts.iter().map(String::as_str));
        serde_json::to_string(&keys).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))
    })?;

    if similarity {
        conn.create_scalar_function("clinical_similarity", 3, flags, |ctx| {
            let text: Option<String> = ctx.get(0)?;
            let query: String = ctx.get(1)?;
            let metric_id: i64 = ctx.get(2)?;
            let metric = SimilarityMetric::from_id(metric_id).ok_or_else(|| {
                rusqlite::Error::UserFunctionError(
                    format!("unknown similarity metric id: {}", metric_id).into(),
                )
            })?;
            Ok(text.map(|t| metric.score(&t, &query)))
        })?;
    }

    Ok(())
}
