//! SQLite schema definition.

/// Base tables. Always required.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- ICD-10 vocabulary (read-mostly, maintained by seeding)
-- ============================================================================

CREATE TABLE IF NOT EXISTS icd10 (
    id INTEGER PRIMARY KEY,                       -- stable key for the search index
    code TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL CHECK (length(trim(description)) > 0),
    search_terms TEXT,                            -- clinician-curated synonyms
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Drug library
-- ============================================================================

CREATE TABLE IF NOT EXISTS drugs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    presentation TEXT,
    strength TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_drugs_name ON drugs(name);

-- ============================================================================
-- Seed runs (one row per bulk import)
-- ============================================================================

CREATE TABLE IF NOT EXISTS seed_runs (
    run_id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    source_sha256 TEXT NOT NULL,
    inserted INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    unchanged INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_seed_runs_finished ON seed_runs(finished_at);
"#;

/// Trigram search index. Applied separately: a SQLite build without the trigram
/// tokenizer still serves every tier by scanning.
///
/// Two structures per vocabulary:
/// - an FTS5 table answering the substring phrase (prefix, substring and code tiers)
/// - a posting table of padded word trigrams answering the fuzzy tier
///
/// The posting triggers call `clinical_trigrams`, so writes need a session that
/// registered the ranking functions.
pub const SEARCH_INDEX_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS icd10_fts USING fts5(
    code,
    description,
    search_terms,
    content='icd10',
    content_rowid='id',
    tokenize='trigram'
);

CREATE TABLE IF NOT EXISTS icd10_trgm (
    trigram TEXT NOT NULL,
    entry_id INTEGER NOT NULL,
    PRIMARY KEY (trigram, entry_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_icd10_trgm_entry ON icd10_trgm(entry_id);

CREATE TRIGGER IF NOT EXISTS icd10_ai AFTER INSERT ON icd10 BEGIN
    INSERT INTO icd10_fts(rowid, code, description, search_terms)
    VALUES (new.id, new.code, new.description, new.search_terms);
    INSERT OR IGNORE INTO icd10_trgm(trigram, entry_id)
    SELECT value, new.id FROM json_each(clinical_trigrams(new.description, new.search_terms));
END;

CREATE TRIGGER IF NOT EXISTS icd10_ad AFTER DELETE ON icd10 BEGIN
    INSERT INTO icd10_fts(icd10_fts, rowid, code, description, search_terms)
    VALUES ('delete', old.id, old.code, old.description, old.search_terms);
    DELETE FROM icd10_trgm WHERE entry_id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS icd10_au AFTER UPDATE ON icd10 BEGIN
    INSERT INTO icd10_fts(icd10_fts, rowid, code, description, search_terms)
    VALUES ('delete', old.id, old.code, old.description, old.search_terms);
    INSERT INTO icd10_fts(rowid, code, description, search_terms)
    VALUES (new.id, new.code, new.description, new.search_terms);
    DELETE FROM icd10_trgm WHERE entry_id = old.id;
    INSERT OR IGNORE INTO icd10_trgm(trigram, entry_id)
    SELECT value, new.id FROM json_each(clinical_trigrams(new.description, new.search_terms));
END;

CREATE VIRTUAL TABLE IF NOT EXISTS drugs_fts USING fts5(
    name,
    content='drugs',
    content_rowid='id',
    tokenize='trigram'
);

CREATE TABLE IF NOT EXISTS drugs_trgm (
    trigram TEXT NOT NULL,
    entry_id INTEGER NOT NULL,
    PRIMARY KEY (trigram, entry_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_drugs_trgm_entry ON drugs_trgm(entry_id);

CREATE TRIGGER IF NOT EXISTS drugs_ai AFTER INSERT ON drugs BEGIN
    INSERT INTO drugs_fts(rowid, name) VALUES (new.id, new.name);
    INSERT OR IGNORE INTO drugs_trgm(trigram, entry_id)
    SELECT value, new.id FROM json_each(clinical_trigrams(new.name));
END;

CREATE TRIGGER IF NOT EXISTS drugs_ad AFTER DELETE ON drugs BEGIN
    INSERT INTO drugs_fts(drugs_fts, rowid, name) VALUES ('delete', old.id, old.name);
    DELETE FROM drugs_trgm WHERE entry_id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS drugs_au AFTER UPDATE ON drugs BEGIN
    INSERT INTO drugs_fts(drugs_fts, rowid, name) VALUES ('delete', old.id, old.name);
    INSERT INTO drugs_fts(rowid, name) VALUES (new.id, new.name);
    DELETE FROM drugs_trgm WHERE entry_id = old.id;
    INSERT OR IGNORE INTO drugs_trgm(trigram, entry_id)
    SELECT value, new.id FROM json_each(clinical_trigrams(new.name));
END;
"#;

/// Names of the FTS5 tables created by [`SEARCH_INDEX_SCHEMA`].
pub const SEARCH_INDEX_TABLES: [&str; 2] = ["icd10_fts", "drugs_fts"];

/// Trigram posting tables, each with the query that derives its rows from the base table.
pub const TRIGRAM_POSTINGS: [(&str, &str); 2] = [
    (
        "icd10_trgm",
        "SELECT DISTINCT t.value, e.id FROM icd10 e, \
         json_each(clinical_trigrams(e.description, e.search_terms)) t",
    ),
    (
        "drugs_trgm",
        "SELECT DISTINCT t.value, e.id FROM drugs e, json_each(clinical_trigrams(e.name)) t",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::functions;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        functions::register(&conn, true).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(SEARCH_INDEX_SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        functions::register(&conn, true).unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
        let result = conn.execute_batch(SEARCH_INDEX_SCHEMA);
        assert!(result.is_ok(), "Index schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = setup();
        assert!(conn.execute_batch(SCHEMA).is_ok());
        assert!(conn.execute_batch(SEARCH_INDEX_SCHEMA).is_ok());
    }

    #[test]
    fn test_empty_description_rejected() {
        let conn = setup();
        let result = conn.execute(
            "INSERT INTO icd10 (code, description) VALUES ('X00', '   ')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_trigram_index_substring_match() {
        let conn = setup();
        conn.execute(
            "INSERT INTO icd10 (code, description, search_terms) VALUES (?, ?, ?)",
            ["E11", "Diabetes mellitus tipo 2", "dm2, diabetes del adulto"],
        )
        .unwrap();

        // Middle-of-word substring, case-insensitive
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM icd10_fts WHERE icd10_fts MATCH '\"MELLI\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        // Curated terms are indexed too
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM icd10_fts WHERE icd10_fts MATCH '\"adulto\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_update_trigger_reindexes() {
        let conn = setup();
        conn.execute(
            "INSERT INTO icd10 (code, description) VALUES ('J45', 'Asma')",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE icd10 SET search_terms = 'broncoespasmo' WHERE code = 'J45'",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM icd10_fts WHERE icd10_fts MATCH '\"espasmo\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_trigram_postings_follow_writes() {
        let conn = setup();
        conn.execute("INSERT INTO icd10 (code, description) VALUES ('J45', 'Asma')", [])
            .unwrap();
        let postings = |conn: &Connection| -> Vec<String> {
            let mut stmt = conn
                .prepare("SELECT trigram FROM icd10_trgm ORDER BY trigram")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };
        assert_eq!(postings(&conn), vec!["  a", " as", "asm", "ma ", "sma"]);

        conn.execute("UPDATE icd10 SET search_terms = 'ab' WHERE code = 'J45'", [])
            .unwrap();
        assert_eq!(postings(&conn).len(), 7);

        conn.execute("DELETE FROM icd10 WHERE code = 'J45'", []).unwrap();
        assert!(postings(&conn).is_empty());
    }

    #[test]
    fn test_code_is_unique() {
        let conn = setup();
        conn.execute("INSERT INTO icd10 (code, description) VALUES ('J45', 'Asma')", [])
            .unwrap();
        let result = conn.execute("INSERT INTO icd10 (code, description) VALUES ('J45', 'Otra')", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_drug_index_trigger() {
        let conn = setup();
        conn.execute("INSERT INTO drugs (name) VALUES ('Metformina')", [])
            .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM drugs_fts WHERE drugs_fts MATCH '\"formi\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
