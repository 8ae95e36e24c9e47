//! Trigram index maintenance.

use super::{Database, DbError, DbResult, SEARCH_INDEX_TABLES, TRIGRAM_POSTINGS};

impl Database {
    /// Rebuild every search index from its content table.
    pub fn rebuild_search_index(&self) -> DbResult<()> {
        self.for_each_index("rebuild")?;
        for (table, derive) in TRIGRAM_POSTINGS {
            self.conn.execute(&format!("DELETE FROM {}", table), [])?;
            self.conn.execute(
                &format!("INSERT INTO {} (trigram, entry_id) {}", table, derive),
                [],
            )?;
        }
        tracing::info!("search index rebuilt");
        Ok(())
    }

    /// Merge index b-trees after bulk writes.
    pub fn optimize_search_index(&self) -> DbResult<()> {
        self.for_each_index("optimize")
    }

    /// Verify that the index matches the content tables.
    pub fn check_search_index(&self) -> DbResult<()> {
        if !self.search_index {
            return Err(DbError::NotFound("search index".to_string()));
        }
        for table in SEARCH_INDEX_TABLES {
            // rank = 1 also compares against the external content table
            self.conn.execute(
                &format!(
                    "INSERT INTO {table}({table}, rank) VALUES ('integrity-check', 1)",
                    table = table
                ),
                [],
            )?;
        }
        for (table, derive) in TRIGRAM_POSTINGS {
            let drift: i64 = self.conn.query_row(
                &format!(
                    "SELECT (SELECT COUNT(*) FROM ({derive} EXCEPT SELECT trigram, entry_id FROM {table})) \
                          + (SELECT COUNT(*) FROM (SELECT trigram, entry_id FROM {table} EXCEPT {derive}))",
                    derive = derive,
                    table = table
                ),
                [],
                |row| row.get(0),
            )?;
            if drift > 0 {
                return Err(DbError::Constraint(format!(
                    "{} is out of sync with its content table ({} rows differ)",
                    table, drift
                )));
            }
        }
        Ok(())
    }

    fn for_each_index(&self, command: &str) -> DbResult<()> {
        if !self.search_index {
            return Err(DbError::NotFound("search index".to_string()));
        }
        for table in SEARCH_INDEX_TABLES {
            self.conn.execute(
                &format!("INSERT INTO {table}({table}) VALUES (?)", table = table),
                [command],
            )?;
        }
        Ok(())
    }
}
