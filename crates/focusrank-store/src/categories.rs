use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{parsed_from_row, ts_to_sql, AppCategory};

impl Database {
    pub fn get_app_category(&self, app_name: &str) -> Result<Option<AppCategory>> {
        let category = self
            .conn()
            .query_row(
                "SELECT app_name, category, multiplier FROM app_categories WHERE app_name = ?1",
                params![app_name],
                row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// Insert or replace a classification. Last write wins.
    pub fn put_app_category(&self, category: &AppCategory) -> Result<()> {
        self.conn().execute(
            "INSERT INTO app_categories (app_name, category, multiplier, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(app_name)
             DO UPDATE SET category   = excluded.category,
                           multiplier = excluded.multiplier,
                           updated_at = excluded.updated_at",
            params![
                category.app_name,
                category.category.as_str(),
                category.multiplier,
                ts_to_sql(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn list_app_categories(&self) -> Result<Vec<AppCategory>> {
        let mut stmt = self.conn().prepare(
            "SELECT app_name, category, multiplier FROM app_categories ORDER BY app_name",
        )?;
        let rows = stmt.query_map([], row_to_category)?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppCategory> {
    Ok(AppCategory {
        app_name: row.get(0)?,
        category: parsed_from_row(row, 1)?,
        multiplier: row.get(2)?,
    })
}
