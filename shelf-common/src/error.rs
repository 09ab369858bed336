//! Errors raised while bootstrapping a shelf process

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the shared config, logging and database setup
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog database could not be opened or migrated
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config file, log file or data directory could not be accessed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or invalid TOML, or a bad log level
    #[error("Configuration error: {0}")]
    Config(String),

    /// A global tracing subscriber is already installed
    #[error("Logging already initialized: {0}")]
    LoggingInit(String),
}
