//! ICD-10 vocabulary operations.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::tiered::{TieredQuery, ICD10};
use super::{Database, DbError, DbResult};
use crate::models::{CodeEntry, UpsertOutcome};
use crate::search::{MatchTier, Ranked, SearchPlan};

/// Tally of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }
}

impl Database {
    /// Insert or update an entry by code.
    pub fn upsert_code_entry(&self, entry: &CodeEntry) -> DbResult<UpsertOutcome> {
        upsert_on(&self.conn, entry)
    }

    /// Upsert many entries in one transaction.
    pub fn upsert_code_entries<'a, I>(&mut self, entries: I) -> DbResult<UpsertCounts>
    where
        I: IntoIterator<Item = &'a CodeEntry>,
    {
        let tx = self.conn.transaction()?;
        let mut counts = UpsertCounts::default();
        for entry in entries {
            counts.record(upsert_on(&tx, entry)?);
        }
        tx.commit()?;
        Ok(counts)
    }

    /// Get an entry by exact code.
    pub fn get_code_entry(&self, code: &str) -> DbResult<Option<CodeEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT code, description, search_terms FROM icd10 WHERE code = ?",
                [code],
                |row| {
                    Ok(CodeEntry {
                        code: row.get(0)?,
                        description: row.get(1)?,
                        search_terms: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    pub fn count_code_entries(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM icd10", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Tiered search: prefix, then substring, then fuzzy/code hits.
    pub fn search_code_entries(&self, plan: &SearchPlan) -> DbResult<Vec<Ranked<CodeEntry>>> {
        let plan = self.effective_plan(plan);
        let query = TieredQuery::build(&ICD10, &plan, self.search_index);
        let tier_column = TieredQuery::tier_column(&ICD10);

        let mut stmt = self.conn.prepare(&query.sql)?;
        let rows = stmt.query_map(query.params().as_slice(), |row| {
            Ok(RankedRow {
                entry: CodeEntry {
                    code: row.get(0)?,
                    description: row.get(1)?,
                    search_terms: row.get(2)?,
                },
                tier: row.get(tier_column)?,
                score: row.get(tier_column + 1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.try_into()?);
        }
        Ok(results)
    }
}

/// Upsert on any connection or transaction.
///
/// Code and description are trimmed. A `None` (or blank) search_terms keeps
/// whatever curated terms are already stored.
pub(crate) fn upsert_on(conn: &Connection, entry: &CodeEntry) -> DbResult<UpsertOutcome> {
    let entry = entry.cleaned();
    let code = entry.code.as_str();
    if code.is_empty() {
        return Err(DbError::Constraint("code must not be empty".to_string()));
    }
    let description = entry.description.as_str();
    if description.is_empty() {
        return Err(DbError::Constraint(format!(
            "description must not be empty (code {})",
            code
        )));
    }
    let search_terms = entry.search_terms.as_deref();

    let existing: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT description, search_terms FROM icd10 WHERE code = ?",
            [code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let outcome = match &existing {
        None => UpsertOutcome::Inserted,
        Some((stored_description, stored_terms)) => {
            let merged_terms = search_terms.or(stored_terms.as_deref());
            if stored_description == description && merged_terms == stored_terms.as_deref() {
                return Ok(UpsertOutcome::Unchanged);
            }
            UpsertOutcome::Updated
        }
    };

    conn.execute(
        r#"
        INSERT INTO icd10 (code, description, search_terms)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(code) DO UPDATE SET
            description = excluded.description,
            search_terms = COALESCE(excluded.search_terms, icd10.search_terms),
            updated_at = datetime('now')
        "#,
        params![code, description, search_terms],
    )?;
    Ok(outcome)
}

/// Intermediate row struct for database mapping.
pub(super) struct RankedRow<T> {
    pub entry: T,
    pub tier: i64,
    pub score: f64,
}

impl<T> TryFrom<RankedRow<T>> for Ranked<T> {
    type Error = DbError;

    fn try_from(row: RankedRow<T>) -> Result<Self, Self::Error> {
        let tier = MatchTier::from_rank(row.tier)
            .ok_or_else(|| DbError::Constraint(format!("invalid tier: {}", row.tier)))?;
        Ok(Ranked {
            item: row.entry,
            tier,
            score: row.score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::search::SimilarityMetric;

    fn seeded() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let entries = vec![
            CodeEntry::new("E10", "Diabetes mellitus tipo 1"),
            CodeEntry::new("E11", "Diabetes mellitus tipo 2")
                .with_search_terms("dm2, diabetes del adulto"),
            CodeEntry::new("E14", "Complicaciones de la diabetes no especificada"),
            CodeEntry::new("J45", "Asma").with_search_terms("broncoespasmo"),
            CodeEntry::new("I10", "Hipertensión esencial").with_search_terms("hta, presión alta"),
        ];
        db.upsert_code_entries(&entries).unwrap();
        db
    }

    fn plan(query: &str, config: &SearchConfig) -> SearchPlan {
        SearchPlan::build(query, None, config, true).unwrap()
    }

    #[test]
    fn test_upsert_outcomes() {
        let db = Database::open_in_memory().unwrap();
        let entry = CodeEntry::new("J45", "Asma");

        assert_eq!(db.upsert_code_entry(&entry).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(db.upsert_code_entry(&entry).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(
            db.upsert_code_entry(&CodeEntry::new("J45", "Asma bronquial")).unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(db.count_code_entries().unwrap(), 1);
    }

    #[test]
    fn test_upsert_trims_and_rejects_blank() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_code_entry(&CodeEntry::new(" J45 ", "  Asma ")).unwrap();

        let entry = db.get_code_entry("J45").unwrap().unwrap();
        assert_eq!(entry.description, "Asma");

        let result = db.upsert_code_entry(&CodeEntry::new("X00", "   "));
        assert!(matches!(result, Err(DbError::Constraint(_))));
        let result = db.upsert_code_entry(&CodeEntry::new("", "Algo"));
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }

    #[test]
    fn test_upsert_collapses_inner_whitespace() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_code_entry(
            &CodeEntry::new("E11", "Diabetes  mellitus\ttipo 2").with_search_terms("dm2,   adulto"),
        )
        .unwrap();

        let entry = db.get_code_entry("E11").unwrap().unwrap();
        assert_eq!(entry.description, "Diabetes mellitus tipo 2");
        assert_eq!(entry.search_terms.as_deref(), Some("dm2, adulto"));

        let exact = SearchConfig::icd10().with_fuzzy(false);
        let results = db.search_code_entries(&plan("diabetes mellitus", &exact)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tier, MatchTier::Prefix);

        // Same text with different spacing is not a change
        assert_eq!(
            db.upsert_code_entry(&CodeEntry::new("E11", "Diabetes mellitus  tipo 2")).unwrap(),
            UpsertOutcome::Unchanged
        );
    }

    #[test]
    fn test_upsert_preserves_curated_terms() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_code_entry(&CodeEntry::new("J45", "Asma").with_search_terms("broncoespasmo"))
            .unwrap();

        // Re-seeding without terms must not wipe them
        assert_eq!(
            db.upsert_code_entry(&CodeEntry::new("J45", "Asma")).unwrap(),
            UpsertOutcome::Unchanged
        );
        let entry = db.get_code_entry("J45").unwrap().unwrap();
        assert_eq!(entry.search_terms.as_deref(), Some("broncoespasmo"));

        db.upsert_code_entry(&CodeEntry::new("J45", "Asma").with_search_terms("asma bronquial"))
            .unwrap();
        let entry = db.get_code_entry("J45").unwrap().unwrap();
        assert_eq!(entry.search_terms.as_deref(), Some("asma bronquial"));
    }

    #[test]
    fn test_get_is_exact() {
        let db = seeded();
        assert!(db.get_code_entry("E11").unwrap().is_some());
        assert!(db.get_code_entry("e11").unwrap().is_none());
        assert!(db.get_code_entry("E1").unwrap().is_none());
    }

    #[test]
    fn test_search_tiers() {
        let db = seeded();
        let config = SearchConfig::icd10();

        let results = db.search_code_entries(&plan("diabetes", &config)).unwrap();
        let codes: Vec<_> = results.iter().map(|r| (r.item.code.as_str(), r.tier)).collect();
        assert_eq!(codes[0].1, MatchTier::Prefix);
        assert_eq!(codes[1].1, MatchTier::Prefix);
        assert!(codes.contains(&("E14", MatchTier::Substring)));
        assert!(codes
            .iter()
            .position(|c| c.0 == "E14")
            .is_some_and(|i| i >= 2));
    }

    #[test]
    fn test_search_curated_terms() {
        let db = seeded();
        let config = SearchConfig::icd10();

        let results = db.search_code_entries(&plan("hta", &config)).unwrap();
        assert_eq!(results[0].item.code, "I10");
        assert_eq!(results[0].tier, MatchTier::Prefix);
    }

    #[test]
    fn test_search_short_query_scans() {
        let db = seeded();
        let config = SearchConfig::icd10();

        let results = db.search_code_entries(&plan("as", &config)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.code, "J45");
    }

    #[test]
    fn test_search_code_hit_is_approximate() {
        let db = seeded();
        let config = SearchConfig::icd10().with_fuzzy(false);

        let results = db.search_code_entries(&plan("e10", &config)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.code, "E10");
        assert_eq!(results[0].tier, MatchTier::Approximate);
    }

    #[test]
    fn test_search_fuzzy_threshold() {
        let db = seeded();

        let results = db
            .search_code_entries(&plan("asma bronquial", &SearchConfig::icd10()))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.code, "J45");
        assert_eq!(results[0].tier, MatchTier::Approximate);

        let strict = SearchConfig::icd10().with_threshold(0.5);
        let results = db.search_code_entries(&plan("asma bronquial", &strict)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_typo_found_by_similarity() {
        let db = seeded();
        let results = db
            .search_code_entries(&plan("hipertension", &SearchConfig::icd10()))
            .unwrap();
        assert_eq!(results[0].item.code, "I10");
        assert_eq!(results[0].tier, MatchTier::Approximate);
    }

    #[test]
    fn test_search_typo_sharing_only_edge_trigrams() {
        let db = seeded();
        let results = db.search_code_entries(&plan("asam", &SearchConfig::icd10())).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.code, "J45");
        assert_eq!(results[0].tier, MatchTier::Approximate);
        assert!((results[0].score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_search_jaro_winkler_scans() {
        let db = seeded();
        let config = SearchConfig::icd10().with_metric(SimilarityMetric::JaroWinkler);
        let results = db.search_code_entries(&plan("asam", &config)).unwrap();

        assert_eq!(results[0].item.code, "J45");
        assert_eq!(results[0].tier, MatchTier::Approximate);
    }

    #[test]
    fn test_search_respects_limit() {
        let db = seeded();
        let plan = SearchPlan::build("diabetes", Some(1), &SearchConfig::icd10(), true).unwrap();
        let results = db.search_code_entries(&plan).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tier, MatchTier::Prefix);
    }
}
