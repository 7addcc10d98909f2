use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No platform data directory to put `focusrank.db` in.
    #[error("No data directory available for the focusrank database")]
    NoDataDir,

    #[error("Filesystem: {0}")]
    Io(#[from] std::io::Error),

    /// The aggregate, message or member a lookup asked for does not exist.
    #[error("Not found")]
    NotFound,

    #[error("Schema migration {name} failed: {source}")]
    Migration {
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
