//! Seed run bookkeeping.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Database, DbResult};

/// Outcome of one bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub run_id: Uuid,
    /// Label of the imported source (usually a file path)
    pub source: String,
    /// Hex-encoded SHA-256 of the source bytes
    pub source_sha256: String,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Rows ignored for a blank code or description
    pub skipped: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SeedReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Database {
    pub fn record_seed_report(&self, report: &SeedReport) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO seed_runs (
                run_id, source, source_sha256, inserted, updated, unchanged, skipped,
                started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                report.run_id.to_string(),
                report.source,
                report.source_sha256,
                report.inserted as i64,
                report.updated as i64,
                report.unchanged as i64,
                report.skipped as i64,
                report.started_at.to_rfc3339(),
                report.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_seed_reports(&self, limit: u32) -> DbResult<Vec<SeedReport>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT run_id, source, source_sha256, inserted, updated, unchanged, skipped,
                   started_at, finished_at
            FROM seed_runs
            ORDER BY finished_at DESC, run_id ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(SeedRunRow {
                run_id: row.get(0)?,
                source: row.get(1)?,
                source_sha256: row.get(2)?,
                inserted: row.get(3)?,
                updated: row.get(4)?,
                unchanged: row.get(5)?,
                skipped: row.get(6)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
            })
        })?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?.try_into()?);
        }
        Ok(reports)
    }
}

/// Intermediate row struct for database mapping.
struct SeedRunRow {
    run_id: String,
    source: String,
    source_sha256: String,
    inserted: i64,
    updated: i64,
    unchanged: i64,
    skipped: i64,
    started_at: String,
    finished_at: String,
}

impl TryFrom<SeedRunRow> for SeedReport {
    type Error = super::DbError;

    fn try_from(row: SeedRunRow) -> Result<Self, Self::Error> {
        let invalid = |what: &str, value: &str| {
            super::DbError::Constraint(format!("invalid {} in seed_runs: {}", what, value))
        };
        let timestamp = |value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| invalid("timestamp", value))
        };

        Ok(SeedReport {
            run_id: Uuid::parse_str(&row.run_id).map_err(|_| invalid("run_id", &row.run_id))?,
            started_at: timestamp(&row.started_at)?,
            finished_at: timestamp(&row.finished_at)?,
            source: row.source,
            source_sha256: row.source_sha256,
            inserted: row.inserted as u64,
            updated: row.updated as u64,
            unchanged: row.unchanged as u64,
            skipped: row.skipped as u64,
        })
    }
}
