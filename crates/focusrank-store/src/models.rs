//! Row structs persisted in the SQLite database.
//!
//! Domain types that are shared with the server and client
//! (`DailyAggregate`, `AppCategory`, `StoredMessage`) live in
//! `focusrank-shared` and are re-exported here.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub use focusrank_shared::protocol::StoredMessage;
pub use focusrank_shared::types::{AppCategory, Category, DailyAggregate, SquadId, UsageSource, UserId};

// ---------------------------------------------------------------------------
// AppUsageEntry
// ---------------------------------------------------------------------------

/// Accumulated minutes one user spent in one app on one day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppUsageEntry {
    pub user_id: UserId,
    /// Normalised app name (trimmed, lower-case).
    pub app_name: String,
    pub date: NaiveDate,
    pub minutes: u32,
}

// ---------------------------------------------------------------------------
// SquadMember
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SquadMember {
    pub squad_id: SquadId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Fixed-width RFC-3339 so stored timestamps sort lexicographically.
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

pub(crate) fn date_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn ts_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn uuid_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let s: String = row.get(idx)?;
    uuid::Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parsed_from_row<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}
