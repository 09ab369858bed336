//! Collaborator seams consumed by the import pipeline
//!
//! Hashing, metadata lookup, physical reorganization and progress reporting
//! are owned elsewhere; the executor only depends on these traits. A SHA-256
//! hasher and a tracing/event-bus reporter are bundled as defaults.

use crate::models::CatalogBook;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use shelf_common::events::{EventBus, ShelfEvent};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Computes a content hash for dedup
#[async_trait]
pub trait ContentHasher: Send + Sync {
    async fn compute_file_hash(&self, path: &Path) -> std::io::Result<String>;
}

/// Fetches fresh metadata for a catalog record
#[async_trait]
pub trait MetadataEnricher: Send + Sync {
    /// Returns the record with enriched fields applied
    async fn fetch_metadata_for_record(&self, book_id: Uuid) -> anyhow::Result<CatalogBook>;
}

/// Physically moves a book into the managed layout
#[async_trait]
pub trait Organizer: Send + Sync {
    /// Returns the book's new path
    async fn organize_book(&self, book: &CatalogBook) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress and cancellation contract for a running job
///
/// Cancellation is cooperative: the executor polls [`is_canceled`](Self::is_canceled)
/// between units of work.
pub trait ProgressReporter: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, detail: Option<&str>);

    fn update_progress(&self, current: usize, total: usize, message: &str);

    fn is_canceled(&self) -> bool;
}

/// SHA-256 over the whole file, hex encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

#[async_trait]
impl ContentHasher for Sha256Hasher {
    async fn compute_file_hash(&self, path: &Path) -> std::io::Result<String> {
        let path_buf = path.to_path_buf();
        tracing::debug!(path = %path_buf.display(), "Calculating SHA-256 hash");

        tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            use std::fs::File;
            use std::io::Read;

            let mut file = File::open(&path_buf)?;
            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; 1024 * 1024]; // 1MB chunks

            loop {
                let bytes_read = file.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                hasher.update(&buffer[..bytes_read]);
            }

            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

/// Default reporter: tracing for logs, [`EventBus`] for progress
///
/// Cancel through the token returned by [`cancel_token`](Self::cancel_token).
pub struct JobReporter {
    job_id: String,
    cancel: CancellationToken,
    event_bus: Arc<EventBus>,
}

impl JobReporter {
    pub fn new(job_id: impl Into<String>, event_bus: Arc<EventBus>) -> Self {
        Self {
            job_id: job_id.into(),
            cancel: CancellationToken::new(),
            event_bus,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl ProgressReporter for JobReporter {
    fn log(&self, level: LogLevel, message: &str, detail: Option<&str>) {
        let detail_text = detail.unwrap_or("");
        match level {
            LogLevel::Debug => tracing::debug!(job_id = %self.job_id, detail = detail_text, "{}", message),
            LogLevel::Info => tracing::info!(job_id = %self.job_id, detail = detail_text, "{}", message),
            LogLevel::Warn => tracing::warn!(job_id = %self.job_id, detail = detail_text, "{}", message),
            LogLevel::Error => tracing::error!(job_id = %self.job_id, detail = detail_text, "{}", message),
        }

        self.event_bus.emit_lossy(ShelfEvent::JobLog {
            job_id: self.job_id.clone(),
            level: level.as_str().to_string(),
            message: message.to_string(),
            detail: detail.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    fn update_progress(&self, current: usize, total: usize, message: &str) {
        tracing::debug!(job_id = %self.job_id, current, total, "{}", message);

        self.event_bus.emit_lossy(ShelfEvent::JobProgress {
            job_id: self.job_id.clone(),
            current,
            total,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
