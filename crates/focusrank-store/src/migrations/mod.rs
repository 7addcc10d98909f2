//! Schema migrations, tracked with `PRAGMA user_version`.
//!
//! Migration `n` in [`MIGRATIONS`] moves the schema from version `n` to
//! `n + 1`. Only the steps above the stored version run.

pub mod v001_initial;
pub mod v002_chat_messages;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

const MIGRATIONS: &[(&str, Step)] = &[
    ("v001_initial", v001_initial::up),
    ("v002_chat_messages", v002_chat_messages::up),
];

pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let stored: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    debug!(stored, target = CURRENT_VERSION, "Schema version");

    for (version, (name, up)) in (1u32..).zip(MIGRATIONS) {
        if version <= stored {
            continue;
        }
        info!(migration = *name, "Applying schema migration");
        up(conn).map_err(|source| StoreError::Migration { name: *name, source })?;
        conn.pragma_update(None, "user_version", version)?;
    }
    Ok(())
}
