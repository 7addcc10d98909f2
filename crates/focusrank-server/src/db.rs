use std::sync::{Arc, Mutex};

use focusrank_store::Database;

use crate::error::ServerError;

/// The single SQLite connection shared by every handler.
///
/// The lock is only ever taken inside [`with_db`], which runs a synchronous
/// closure, so it can never be held across an `.await`.
pub type SharedDb = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}

pub fn with_db<T>(
    db: &SharedDb,
    f: impl FnOnce(&Database) -> focusrank_store::Result<T>,
) -> Result<T, ServerError> {
    let guard = db
        .lock()
        .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
    Ok(f(&*guard)?)
}
