//! # focusrank-store
//!
//! SQLite persistence for usage tracking, app categories, squad membership
//! and squad chat.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every table. Row
//! uniqueness (one daily aggregate per user and date, one category per app,
//! one message per client key) is enforced by the schema and relied on by the
//! upserts.

pub mod categories;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod squads;
pub mod usage;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
