//! Error types for shelf-itunes
//!
//! Fatal failures (malformed export, write-back validation, store errors)
//! propagate as [`Error`]. Per-item failures inside a phase are converted into
//! [`ImportStatus`](crate::models::ImportStatus) entries instead.

use crate::export::ParseError;
use crate::fingerprint::LibraryModified;
use crate::itl::ItlError;
use crate::location::DecodeError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for shelf-itunes operations
pub type Result<T> = std::result::Result<T, Error>;

/// shelf-itunes error type
#[derive(Debug, Error)]
pub enum Error {
    /// Export file is unreadable or structurally malformed
    #[error("Failed to parse library export: {0}")]
    Parse(#[from] ParseError),

    /// A single track location could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Track location resolved to a file that does not exist
    #[error("file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    /// Export changed since the stored fingerprint was taken
    #[error(transparent)]
    Conflict(#[from] LibraryModified),

    /// Request or rewritten export failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Binary library could not be read or rewritten
    #[error(transparent)]
    Itl(#[from] ItlError),

    /// Write-back failed and the export was restored
    #[error("Write-back failed: {0}")]
    WriteBack(String),

    /// Unknown job id or persistent id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catalog store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Enricher or organizer failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// shelf-common error
    #[error("Common error: {0}")]
    Common(#[from] shelf_common::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the write-back fingerprint conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("JSON serialization failed: {}", e))
    }
}
