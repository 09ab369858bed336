//! Export write-back
//!
//! Writes catalog file locations back into the media player's export, and
//! optionally its binary library, so the player keeps finding books after
//! they are reorganized.
//!
//! # Safety
//! 1. Stored fingerprint is compared (size, mtime, checksum) before anything
//!    is touched; a mismatch is a [`Conflict`](crate::Error::Conflict)
//! 2. A timestamped backup is written next to the export
//! 3. Only `Location` values change; the rest of the file is byte-identical
//! 4. The rewritten export is validated; on failure the original bytes held
//!    in memory are restored

mod batcher;
mod rewrite;

pub use batcher::WriteBackBatcher;

use crate::catalog::CatalogStore;
use crate::export::parse_library;
use crate::fingerprint::{LibraryFingerprint, LibraryModified};
use crate::itl::{write_itl_locations, ItlLocationUpdate};
use crate::location::{encode_location, reverse_remap};
use crate::{Error, Result};
use chrono::{Local, Utc};
use rewrite::rewrite_locations;
use serde::{Deserialize, Serialize};
use shelf_common::config::PathMapping;
use shelf_common::events::{EventBus, ShelfEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// One location update keyed by persistent id
///
/// `new_path` is advisory: the engine writes the path the catalog holds for
/// the persistent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBackUpdate {
    pub persistent_id: String,
    pub new_path: String,
}

#[derive(Debug, Clone)]
pub struct WriteBackRequest {
    pub library_path: PathBuf,
    pub updates: Vec<WriteBackUpdate>,
    pub create_backup: bool,
    /// Skip the fingerprint conflict check
    pub force_overwrite: bool,
    pub path_mappings: Vec<PathMapping>,
}

impl WriteBackRequest {
    pub fn new(library_path: impl Into<PathBuf>, updates: Vec<WriteBackUpdate>) -> Self {
        Self {
            library_path: library_path.into(),
            updates,
            create_backup: true,
            force_overwrite: false,
            path_mappings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBackResult {
    pub updated_count: usize,
    pub backup_path: Option<PathBuf>,
    pub message: String,
}

/// Checks a rewritten export before it is accepted
pub trait ExportValidator: Send + Sync {
    /// `expected` maps persistent id → raw location that must now be present
    fn validate(&self, path: &Path, expected: &HashMap<String, String>) -> Result<()>;
}

/// Re-parses the export and checks every rewritten location
#[derive(Debug, Clone, Copy, Default)]
pub struct ReparseValidator;

impl ExportValidator for ReparseValidator {
    fn validate(&self, path: &Path, expected: &HashMap<String, String>) -> Result<()> {
        let library = parse_library(path)?;
        for (persistent_id, location) in expected {
            let Some(track) = library.track_by_persistent_id(persistent_id) else {
                continue;
            };
            if &track.location != location {
                return Err(Error::Validation(format!(
                    "location for {} is {:?}, expected {:?}",
                    persistent_id, track.location, location
                )));
            }
        }
        Ok(())
    }
}

pub struct WriteBackEngine {
    catalog: Arc<dyn CatalogStore>,
    event_bus: Arc<EventBus>,
    validator: Arc<dyn ExportValidator>,
}

impl WriteBackEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, event_bus: Arc<EventBus>) -> Self {
        Self {
            catalog,
            event_bus,
            validator: Arc::new(ReparseValidator),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn ExportValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Rewrite export locations for the given updates
    pub async fn write_back(&self, request: &WriteBackRequest) -> Result<WriteBackResult> {
        let library_key = request.library_path.to_string_lossy().into_owned();

        let resolved = self.resolve_updates(&request.updates).await?;
        if resolved.is_empty() {
            return Err(Error::Validation("no write-back updates to apply".to_string()));
        }

        if !request.library_path.is_file() {
            return Err(Error::NotFound(format!("library export {}", library_key)));
        }

        // Set when the stored fingerprint was checked and still describes the file
        let mut verified = false;
        if !request.force_overwrite {
            if let Some(stored) = self.catalog.get_library_fingerprint(&library_key).await? {
                let current = LibraryFingerprint::compute(&request.library_path).await?;
                if !stored.matches_strict(&current) {
                    tracing::warn!(library = %library_key, "Library export modified since last sync, refusing write-back");
                    return Err(Error::Conflict(LibraryModified { stored, current }));
                }
                verified = true;
            }
        }

        let original = tokio::fs::read(&request.library_path).await?;
        let original_text = String::from_utf8(original.clone())
            .map_err(|e| crate::export::ParseError::Encoding(e.to_string()))?;

        let backup_path = if request.create_backup {
            let backup = backup_path_for(&request.library_path);
            tokio::fs::write(&backup, &original).await?;
            tracing::info!(backup = %backup.display(), "Created library backup");
            Some(backup)
        } else {
            None
        };

        // persistent id → raw location in the export's prefix space
        let expected: HashMap<String, String> = resolved
            .into_iter()
            .map(|(pid, path)| {
                let raw = reverse_remap(&encode_location(Path::new(&path)), &request.path_mappings);
                (pid, raw)
            })
            .collect();

        let rewrite = {
            let expected = expected.clone();
            tokio::task::spawn_blocking(move || rewrite_locations(&original_text, &expected))
                .await
                .map_err(|e| Error::Internal(format!("rewrite task failed: {}", e)))??
        };

        if let Err(e) = write_atomically(&request.library_path, rewrite.text.as_bytes()).await {
            self.restore(&request.library_path, &original, verified).await;
            return Err(Error::WriteBack(format!("failed to write updated export: {}", e)));
        }

        let validation = {
            let validator = Arc::clone(&self.validator);
            let path = request.library_path.clone();
            let expected = expected.clone();
            tokio::task::spawn_blocking(move || validator.validate(&path, &expected))
                .await
                .map_err(|e| Error::Internal(format!("validation task failed: {}", e)))?
        };
        if let Err(e) = validation {
            tracing::error!(library = %library_key, error = %e, "Rewritten export failed validation, restoring original");
            self.restore(&request.library_path, &original, verified).await;
            return Err(Error::WriteBack(format!("validation failed, original restored: {}", e)));
        }

        let fingerprint = LibraryFingerprint::compute(&request.library_path).await?;
        self.catalog.save_library_fingerprint(&fingerprint).await?;

        let message = format!("Successfully updated {} audiobook locations", rewrite.updated_count);
        tracing::info!(library = %library_key, updated = rewrite.updated_count, "{}", message);

        self.event_bus.emit_lossy(ShelfEvent::LibraryWritten {
            library_path: library_key,
            updated_count: rewrite.updated_count,
            backup_path: backup_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            timestamp: Utc::now(),
        });

        Ok(WriteBackResult {
            updated_count: rewrite.updated_count,
            backup_path,
            message,
        })
    }

    /// Rewrite locations in the player's binary library
    ///
    /// Paths are resolved from the catalog as for the export. No backup and
    /// no fingerprint check: the file is replaced atomically only after the
    /// rewritten image decodes.
    pub async fn write_back_itl(
        &self,
        itl_path: &Path,
        updates: &[WriteBackUpdate],
        path_mappings: &[PathMapping],
    ) -> Result<usize> {
        let resolved = self.resolve_updates(updates).await?;
        if resolved.is_empty() {
            return Ok(0);
        }

        let itl_updates: Vec<ItlLocationUpdate> = resolved
            .into_iter()
            .map(|(persistent_id, path)| ItlLocationUpdate {
                persistent_id,
                location_url: reverse_remap(&encode_location(Path::new(&path)), path_mappings),
            })
            .collect();

        let path = itl_path.to_path_buf();
        let updated = tokio::task::spawn_blocking(move || write_itl_locations(&path, &itl_updates))
            .await
            .map_err(|e| Error::Internal(format!("binary library task failed: {}", e)))??;

        tracing::info!(itl = %itl_path.display(), updated, "Updated binary library locations");
        Ok(updated)
    }

    /// Dry run: warnings for ids missing from the export and paths missing on disk
    pub async fn preview(&self, request: &WriteBackRequest) -> Result<Vec<String>> {
        let library = crate::export::load_library(&request.library_path).await?;
        let resolved = self.resolve_updates(&request.updates).await?;

        let mut warnings = Vec::new();
        for update in &request.updates {
            if library.track_by_persistent_id(&update.persistent_id).is_none() {
                warnings.push(format!(
                    "Persistent ID not found in library export: {}",
                    update.persistent_id
                ));
                continue;
            }

            let path = resolved
                .get(&update.persistent_id)
                .unwrap_or(&update.new_path);
            if !Path::new(path).exists() {
                warnings.push(format!("New file path does not exist: {}", path));
            }
        }

        Ok(warnings)
    }

    /// Updates for catalog books, one per segment for multi-track books
    ///
    /// Books without a persistent id are dropped.
    pub async fn updates_for_books(&self, book_ids: &[Uuid]) -> Result<Vec<WriteBackUpdate>> {
        let mut updates = Vec::new();

        for id in book_ids {
            let Some(book) = self.catalog.get_book(*id).await? else {
                tracing::debug!(book_id = %id, "Book not found, skipping write-back");
                continue;
            };
            let Some(persistent_id) = book.persistent_id() else {
                continue;
            };

            let segments = self.catalog.list_segments(book.id).await?;
            if segments.is_empty() {
                updates.push(WriteBackUpdate {
                    persistent_id: persistent_id.to_string(),
                    new_path: book.file_path.clone(),
                });
                continue;
            }

            for segment in segments {
                if let Some(pid) = segment.persistent_id.filter(|p| !p.is_empty()) {
                    updates.push(WriteBackUpdate {
                        persistent_id: pid,
                        new_path: segment.file_path,
                    });
                }
            }
        }

        Ok(updates)
    }

    /// Catalog path for each update's persistent id; unknown ids are dropped
    async fn resolve_updates(&self, updates: &[WriteBackUpdate]) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::new();

        for update in updates {
            let pid = update.persistent_id.as_str();
            if pid.is_empty() {
                continue;
            }

            let path = match self.catalog.get_book_by_persistent_id(pid).await? {
                Some(book) => {
                    let segments = self.catalog.list_segments(book.id).await?;
                    segments
                        .into_iter()
                        .find(|s| s.persistent_id.as_deref() == Some(pid))
                        .map(|s| s.file_path)
                        .or(Some(book.file_path))
                }
                None => self
                    .catalog
                    .get_segment_by_persistent_id(pid)
                    .await?
                    .map(|s| s.file_path),
            };

            match path {
                Some(path) => {
                    if path != update.new_path {
                        tracing::debug!(persistent_id = pid, catalog_path = %path, requested = %update.new_path, "Using catalog path for write-back");
                    }
                    resolved.insert(pid.to_string(), path);
                }
                None => tracing::debug!(persistent_id = pid, "No catalog record for persistent id, dropping update"),
            }
        }

        Ok(resolved)
    }

    /// Put the original bytes back
    ///
    /// The rename changes the mtime, so a fingerprint that was verified
    /// against these bytes is stored again for the restored file.
    async fn restore(&self, path: &Path, original: &[u8], verified: bool) {
        if let Err(e) = write_atomically(path, original).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to restore original export");
            return;
        }
        if !verified {
            return;
        }

        let refreshed = match LibraryFingerprint::compute(path).await {
            Ok(fingerprint) => self.catalog.save_library_fingerprint(&fingerprint).await,
            Err(e) => Err(Error::from(e)),
        };
        if let Err(e) = refreshed {
            tracing::warn!(path = %path.display(), error = %e, "Failed to refresh fingerprint after restore");
        }
    }
}

/// `<export>.backup.YYYYMMDD-HHMMSS`, suffixed `-N` if taken
fn backup_path_for(library_path: &Path) -> PathBuf {
    let base = format!(
        "{}.backup.{}",
        library_path.to_string_lossy(),
        Local::now().format("%Y%m%d-%H%M%S")
    );

    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}-{}", base, n));
        n += 1;
    }
    candidate
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
