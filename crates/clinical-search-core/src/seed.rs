//! Bulk import of ICD-10 codes from delimited text.
//!
//! Expected header (case-insensitive, accents optional):
//!
//! ```csv
//! code,description,search_terms
//! E11,Diabetes mellitus tipo 2,"dm2, diabetes del adulto"
//! ```
//!
//! `clave` / `descripción` / `términos` are accepted as header aliases. The
//! `search_terms` column is optional; leaving it out (or blank) keeps curated
//! terms already stored for that code.

use std::fs;
use std::path::Path;

use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, Trim};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Database, DbError, SeedReport};
use crate::models::CodeEntry;

const CODE_HEADERS: &[&str] = &["code", "clave", "codigo", "código"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "descripcion", "descripción"];
const TERMS_HEADERS: &[&str] = &["search_terms", "terminos", "términos"];

/// Seeding errors.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Rows read from a source, before they touch the database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSeed {
    pub entries: Vec<CodeEntry>,
    /// Rows with a blank code or description
    pub skipped: u64,
}

/// Reads code lists and upserts them.
#[derive(Debug, Clone)]
pub struct CsvSeeder {
    delimiter: u8,
}

impl Default for CsvSeeder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvSeeder {
    /// Comma-delimited seeder.
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<ParsedSeed, SeedError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        let code_col = find_column(&headers, CODE_HEADERS).ok_or(SeedError::MissingColumn("code"))?;
        let description_col = find_column(&headers, DESCRIPTION_HEADERS)
            .ok_or(SeedError::MissingColumn("description"))?;
        let terms_col = find_column(&headers, TERMS_HEADERS);

        let mut parsed = ParsedSeed::default();
        for record in reader.records() {
            let record = record?;
            let code = record.get(code_col).unwrap_or_default();
            let description = record.get(description_col).unwrap_or_default();
            if code.is_empty() || description.is_empty() {
                parsed.skipped += 1;
                continue;
            }

            let mut entry = CodeEntry::new(code, description);
            entry.search_terms = terms_col
                .and_then(|col| record.get(col))
                .filter(|terms| !terms.is_empty())
                .map(str::to_string);
            parsed.entries.push(entry);
        }
        Ok(parsed)
    }

    pub fn seed_file<P: AsRef<Path>>(&self, db: &mut Database, path: P) -> Result<SeedReport, SeedError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        self.seed_bytes(db, &path.display().to_string(), &bytes)
    }

    /// Upsert every row in one transaction and record the run.
    pub fn seed_bytes(&self, db: &mut Database, source: &str, bytes: &[u8]) -> Result<SeedReport, SeedError> {
        let started_at = Utc::now();
        let source_sha256 = hex::encode(Sha256::digest(bytes));

        let parsed = self.parse(bytes)?;
        let counts = db.upsert_code_entries(&parsed.entries)?;
        if db.capabilities().trigram_index {
            db.optimize_search_index()?;
        }

        let report = SeedReport {
            run_id: Uuid::new_v4(),
            source: source.to_string(),
            source_sha256,
            inserted: counts.inserted,
            updated: counts.updated,
            unchanged: counts.unchanged,
            skipped: parsed.skipped,
            started_at,
            finished_at: Utc::now(),
        };
        db.record_seed_report(&report)?;

        tracing::info!(
            run_id = %report.run_id,
            source,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "seed complete"
        );
        Ok(report)
    }
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.trim_start_matches('\u{feff}').trim().to_lowercase();
        names.contains(&header.as_str())
    })
}
