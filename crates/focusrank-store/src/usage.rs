//! Usage persistence.
//!
//! The two tables deliberately disagree on re-ingestion: per-app minutes in
//! `app_usage` are **added** to what is already stored for the same
//! (user, app, date), while a `daily_aggregates` row is **replaced** wholesale
//! for the same (user, date). Downstream code may rely on either behaviour, so
//! both are kept as they are.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    date_from_row, date_to_sql, parsed_from_row, ts_to_sql, AppUsageEntry, DailyAggregate, UserId,
};

impl Database {
    /// Add minutes to a user's per-app total for a day. Returns the new total.
    pub fn add_app_usage(
        &self,
        user_id: &UserId,
        app_name: &str,
        date: NaiveDate,
        minutes: u32,
    ) -> Result<u32> {
        let total = self.conn().query_row(
            "INSERT INTO app_usage (user_id, app_name, date, minutes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, app_name, date)
             DO UPDATE SET minutes = minutes + excluded.minutes,
                           updated_at = excluded.updated_at
             RETURNING minutes",
            params![
                user_id.as_str(),
                app_name,
                date_to_sql(date),
                minutes,
                ts_to_sql(Utc::now()),
            ],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Every per-app row a user has for one day.
    pub fn app_usage_for_day(&self, user_id: &UserId, date: NaiveDate) -> Result<Vec<AppUsageEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, app_name, date, minutes
             FROM app_usage
             WHERE user_id = ?1 AND date = ?2
             ORDER BY app_name",
        )?;

        let rows = stmt.query_map(params![user_id.as_str(), date_to_sql(date)], |row| {
            Ok(AppUsageEntry {
                user_id: UserId(row.get(0)?),
                app_name: row.get(1)?,
                date: date_from_row(row, 2)?,
                minutes: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Stored per-app minutes for one (user, app, date), if any.
    pub fn app_usage_minutes(
        &self,
        user_id: &UserId,
        app_name: &str,
        date: NaiveDate,
    ) -> Result<Option<u32>> {
        let minutes = self
            .conn()
            .query_row(
                "SELECT minutes FROM app_usage
                 WHERE user_id = ?1 AND app_name = ?2 AND date = ?3",
                params![user_id.as_str(), app_name, date_to_sql(date)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(minutes)
    }

    /// Insert or replace the daily aggregate for (user_id, date).
    pub fn upsert_daily_aggregate(&self, day: &DailyAggregate) -> Result<()> {
        self.conn().execute(
            "INSERT INTO daily_aggregates
                (user_id, date, productive_mins, unproductive_mins, neutral_mins, source, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id, date)
             DO UPDATE SET productive_mins   = excluded.productive_mins,
                           unproductive_mins = excluded.unproductive_mins,
                           neutral_mins      = excluded.neutral_mins,
                           source            = excluded.source,
                           updated_at        = excluded.updated_at",
            params![
                day.user_id.as_str(),
                date_to_sql(day.date),
                day.productive_mins,
                day.unproductive_mins,
                day.neutral_mins,
                day.source.as_str(),
                ts_to_sql(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn get_daily_aggregate(&self, user_id: &UserId, date: NaiveDate) -> Result<DailyAggregate> {
        self.conn()
            .query_row(
                "SELECT user_id, date, productive_mins, unproductive_mins, neutral_mins, source
                 FROM daily_aggregates WHERE user_id = ?1 AND date = ?2",
                params![user_id.as_str(), date_to_sql(date)],
                row_to_aggregate,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The user's most recent daily aggregates, newest first.
    pub fn recent_daily_aggregates(&self, user_id: &UserId, limit: u32) -> Result<Vec<DailyAggregate>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, date, productive_mins, unproductive_mins, neutral_mins, source
             FROM daily_aggregates
             WHERE user_id = ?1
             ORDER BY date DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user_id.as_str(), limit], row_to_aggregate)?;

        let mut days = Vec::new();
        for row in rows {
            days.push(row?);
        }
        Ok(days)
    }

    /// Daily aggregates with `from <= date <= to`, newest first.
    pub fn daily_aggregates_between(
        &self,
        user_id: &UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyAggregate>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, date, productive_mins, unproductive_mins, neutral_mins, source
             FROM daily_aggregates
             WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date DESC",
        )?;

        let rows = stmt.query_map(
            params![user_id.as_str(), date_to_sql(from), date_to_sql(to)],
            row_to_aggregate,
        )?;

        let mut days = Vec::new();
        for row in rows {
            days.push(row?);
        }
        Ok(days)
    }
}

fn row_to_aggregate(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyAggregate> {
    Ok(DailyAggregate {
        user_id: UserId(row.get(0)?),
        date: date_from_row(row, 1)?,
        productive_mins: row.get(2)?,
        unproductive_mins: row.get(3)?,
        neutral_mins: row.get(4)?,
        source: parsed_from_row(row, 5)?,
    })
}
