//! v001 -- Initial schema creation.
//!
//! Creates the usage-tracking tables: `app_usage`, `daily_aggregates`,
//! `app_categories`, and the cohort table `squad_members`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Raw per-app usage (additive per user/app/date)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS app_usage (
    user_id    TEXT NOT NULL,
    app_name   TEXT NOT NULL,                 -- normalised (trimmed, lower-case)
    date       TEXT NOT NULL,                 -- YYYY-MM-DD
    minutes    INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,                 -- RFC-3339

    PRIMARY KEY (user_id, app_name, date)
);

-- ----------------------------------------------------------------
-- Daily three-bucket totals (overwritten per user/date)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS daily_aggregates (
    user_id           TEXT NOT NULL,
    date              TEXT NOT NULL,          -- YYYY-MM-DD
    productive_mins   INTEGER NOT NULL,
    unproductive_mins INTEGER NOT NULL,
    neutral_mins      INTEGER NOT NULL,
    source            TEXT NOT NULL,          -- 'apps' | 'aggregate'
    updated_at        TEXT NOT NULL,

    PRIMARY KEY (user_id, date)
);

CREATE INDEX IF NOT EXISTS idx_daily_aggregates_user_date
    ON daily_aggregates(user_id, date DESC);

-- ----------------------------------------------------------------
-- Global app classification cache
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS app_categories (
    app_name   TEXT PRIMARY KEY NOT NULL,
    category   TEXT NOT NULL,                 -- productive | unproductive | utility
    multiplier INTEGER NOT NULL,              -- +1 | -1 | 0
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Squads (cohorts)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS squad_members (
    squad_id  TEXT NOT NULL,                  -- UUID v4
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL,

    PRIMARY KEY (squad_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_squad_members_user ON squad_members(user_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
