//! Drug library operations.

use rusqlite::{params, OptionalExtension, Row};

use super::icd10::RankedRow;
use super::tiered::{TieredQuery, DRUGS};
use super::{Database, DbError, DbResult};
use crate::models::{Drug, NewDrug};
use crate::search::{Ranked, SearchPlan};

fn drug_from_row(row: &Row<'_>) -> rusqlite::Result<Drug> {
    Ok(Drug {
        id: row.get(0)?,
        name: row.get(1)?,
        presentation: row.get(2)?,
        strength: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Database {
    /// Add a drug; fields are trimmed and blank optional fields stored as NULL.
    pub fn insert_drug(&self, drug: &NewDrug) -> DbResult<Drug> {
        let drug = drug
            .cleaned()
            .ok_or_else(|| DbError::Constraint("drug name must not be empty".to_string()))?;

        let created = self.conn.query_row(
            r#"
            INSERT INTO drugs (name, presentation, strength)
            VALUES (?1, ?2, ?3)
            RETURNING id, name, presentation, strength, created_at
            "#,
            params![drug.name, drug.presentation, drug.strength],
            drug_from_row,
        )?;
        Ok(created)
    }

    pub fn get_drug(&self, id: i64) -> DbResult<Option<Drug>> {
        let drug = self
            .conn
            .query_row(
                "SELECT id, name, presentation, strength, created_at FROM drugs WHERE id = ?",
                [id],
                drug_from_row,
            )
            .optional()?;
        Ok(drug)
    }

    /// Tiered search over drug names.
    pub fn search_drugs(&self, plan: &SearchPlan) -> DbResult<Vec<Ranked<Drug>>> {
        let plan = self.effective_plan(plan);
        let query = TieredQuery::build(&DRUGS, &plan, self.search_index);
        let tier_column = TieredQuery::tier_column(&DRUGS);

        let mut stmt = self.conn.prepare(&query.sql)?;
        let rows = stmt.query_map(query.params().as_slice(), |row| {
            Ok(RankedRow {
                entry: drug_from_row(row)?,
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
