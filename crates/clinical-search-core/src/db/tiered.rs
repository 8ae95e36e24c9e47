//! Single-statement tiered search over a vocabulary table.
//!
//! Candidates come from the search index when the plan allows it: the FTS5 substring phrase,
//! plus every entry sharing a padded trigram with the query when the fuzzy tier is active.
//! Otherwise the statement scans. Each candidate then gets a tier and a score and SQLite
//! sorts once before applying LIMIT.

use rusqlite::ToSql;

use crate::search::SearchPlan;

/// Column layout of a searchable table.
pub(crate) struct Vocabulary {
    pub table: &'static str,
    /// FTS5 table indexing `table`
    pub index: &'static str,
    /// Trigram posting table for `table`
    pub postings: &'static str,
    /// Integer key shared by the FTS5 rowid and the postings
    pub id: &'static str,
    /// Projected columns, in row-mapping order
    pub columns: &'static [&'static str],
    pub primary: &'static str,
    pub secondary: Option<&'static str>,
    /// Column whose substring hits always qualify
    pub key: Option<&'static str>,
    /// Final deterministic tiebreak
    pub order_keys: &'static str,
}

pub(crate) const ICD10: Vocabulary = Vocabulary {
    table: "icd10",
    index: "icd10_fts",
    postings: "icd10_trgm",
    id: "id",
    columns: &["code", "description", "search_terms"],
    primary: "description",
    secondary: Some("search_terms"),
    key: Some("code"),
    order_keys: "code ASC",
};

pub(crate) const DRUGS: Vocabulary = Vocabulary {
    table: "drugs",
    index: "drugs_fts",
    postings: "drugs_trgm",
    id: "id",
    columns: &["id", "name", "presentation", "strength", "created_at"],
    primary: "name",
    secondary: None,
    key: None,
    order_keys: "name ASC, id ASC",
};

/// SQL text plus its named parameters.
pub(crate) struct TieredQuery {
    pub sql: String,
    params: Vec<(&'static str, Box<dyn ToSql>)>,
}

impl TieredQuery {
    /// Build the statement. `use_index` must only be set when `vocab.index` exists.
    pub fn build(vocab: &Vocabulary, plan: &SearchPlan, use_index: bool) -> Self {
        let mut params: Vec<(&'static str, Box<dyn ToSql>)> = vec![
            (":query", Box::new(plan.query().to_string())),
            (":limit", Box::new(i64::from(plan.limit()))),
        ];

        let projection = vocab
            .columns
            .iter()
            .map(|c| format!("e.{}", c))
            .collect::<Vec<_>>()
            .join(", ");

        let secondary = vocab
            .secondary
            .map(|c| format!("e.{}", c))
            .unwrap_or_else(|| "NULL".to_string());

        let score = match plan.fuzzy() {
            Some(fuzzy) => {
                params.push((":metric", Box::new(fuzzy.metric.id())));
                params.push((":threshold", Box::new(fuzzy.threshold)));
                let primary = format!(
                    "COALESCE(clinical_similarity(e.{}, :query, :metric), 0.0)",
                    vocab.primary
                );
                match vocab.secondary {
                    Some(column) => format!(
                        "MAX({}, COALESCE(clinical_similarity(e.{}, :query, :metric), 0.0))",
                        primary, column
                    ),
                    None => primary,
                }
            }
            None => "0.0".to_string(),
        };

        let key_hit = vocab
            .key
            .map(|c| format!("clinical_contains(e.{}, :query)", c))
            .unwrap_or_else(|| "0".to_string());

        let candidates = match plan.index_expression() {
            Some(expression) if use_index => {
                params.push((":match", Box::new(expression.to_string())));
                let mut clause = format!(
                    "WHERE e.{id} IN (SELECT rowid FROM {index} WHERE {index} MATCH :match)",
                    id = vocab.id,
                    index = vocab.index
                );
                if let Some(keys) = plan.index_trigrams() {
                    params.push((":trigrams", Box::new(trigram_json(keys))));
                    clause.push_str(&format!(
                        " OR e.{id} IN (SELECT entry_id FROM {postings} \
                         WHERE trigram IN (SELECT value FROM json_each(:trigrams)))",
                        id = vocab.id,
                        postings = vocab.postings
                    ));
                }
                clause
            }
            _ => String::new(),
        };

        let qualifies = if plan.is_fuzzy() {
            "tier < 2 OR key_hit OR score > :threshold"
        } else {
            "tier < 2 OR key_hit"
        };

        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {projection},
                       clinical_tier(:query, e.{primary}, {secondary}) AS tier,
                       {score} AS score,
                       {key_hit} AS key_hit
                FROM {table} e
                {candidates}
            )
            WHERE {qualifies}
            ORDER BY tier ASC, score DESC, {order_keys}
            LIMIT :limit
            "#,
            projection = projection,
            primary = vocab.primary,
            secondary = secondary,
            score = score,
            key_hit = key_hit,
            table = vocab.table,
            candidates = candidates,
            qualifies = qualifies,
            order_keys = vocab.order_keys,
        );

        Self { sql, params }
    }

    /// Parameters in the form rusqlite binds by name.
    pub fn params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (*name, value.as_ref()))
            .collect()
    }

    /// Index of the `tier` column in result rows.
    pub fn tier_column(vocab: &Vocabulary) -> usize {
        vocab.columns.len()
    }
}

fn trigram_json(keys: &[String]) -> String {
    serde_json::Value::from(keys.to_vec()).to_string()
}
