//! Sync reconciler
//!
//! Re-reads an export and mirrors its mutable per-book fields (play count,
//! rating, bookmark, last played) onto books already in the catalog. Groups
//! whose persistent id is unknown are imported as new books without the
//! dedup or block-list checks: the export is authoritative for new entries.
//! Groups without a persistent id are skipped.

use crate::catalog::CatalogStore;
use crate::export::load_library;
use crate::fingerprint::LibraryFingerprint;
use crate::grouper::{group_tracks, AlbumGroup};
use crate::models::{CatalogBook, JobParams, Track};
use crate::services::collaborators::{ContentHasher, LogLevel, ProgressReporter};
use crate::services::import_pipeline::{build_candidate, ImportPipeline};
use crate::Result;
use serde::Serialize;
use shelf_common::config::{ImportTuning, PathMapping};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub library_path: PathBuf,
    pub path_mappings: Vec<PathMapping>,
    /// Run even when the stored fingerprint says nothing changed
    pub force: bool,
}

impl SyncRequest {
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            path_mappings: Vec::new(),
            force: false,
        }
    }
}

/// Sync counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Export matched the stored fingerprint; nothing was read
    pub library_unchanged: bool,
    /// Stopped before every group was visited; fingerprint left as it was
    pub canceled: bool,
}

impl SyncSummary {
    pub fn message(&self) -> String {
        if self.library_unchanged {
            return "Library unchanged since last sync".to_string();
        }
        let outcome = if self.canceled { "canceled" } else { "completed" };
        format!(
            "Sync {}: {} new, {} updated, {} unchanged, {} skipped, {} failed",
            outcome, self.new, self.updated, self.unchanged, self.skipped, self.failed
        )
    }

    fn record_failure(&mut self, message: String, limit: usize) {
        self.failed += 1;
        if self.errors.len() < limit {
            self.errors.push(message);
        }
    }
}

pub struct SyncReconciler {
    catalog: Arc<dyn CatalogStore>,
    pipeline: ImportPipeline,
    tuning: ImportTuning,
}

impl SyncReconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>, hasher: Arc<dyn ContentHasher>, tuning: ImportTuning) -> Self {
        Self {
            pipeline: ImportPipeline::new(Arc::clone(&catalog), hasher),
            catalog,
            tuning,
        }
    }

    pub async fn sync(&self, request: &SyncRequest, reporter: &dyn ProgressReporter) -> Result<SyncSummary> {
        let import_source = request.library_path.to_string_lossy().into_owned();

        if !request.force {
            if let Some(stored) = self.catalog.get_library_fingerprint(&import_source).await? {
                match LibraryFingerprint::stat(&request.library_path) {
                    Ok(current) if stored.matches(&current) => {
                        tracing::info!(library = %import_source, "Library unchanged since last sync");
                        return Ok(SyncSummary {
                            library_unchanged: true,
                            ..SyncSummary::default()
                        });
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(library = %import_source, error = %e, "Failed to stat library export"),
                }
            }
        }

        let library = load_library(&request.library_path).await?;
        let groups = group_tracks(&library.tracks);
        let total = groups.len();

        let mut params = JobParams::new(&request.library_path);
        params.path_mappings = request.path_mappings.clone();

        tracing::info!(library = %import_source, groups = total, "Starting library sync");
        reporter.log(LogLevel::Info, &format!("Syncing {} audiobook groups", total), None);

        let mut summary = SyncSummary {
            total,
            ..SyncSummary::default()
        };
        let progress_batch = self.tuning.progress_batch.max(1);

        for (index, group) in groups.iter().enumerate() {
            if reporter.is_canceled() {
                reporter.log(LogLevel::Info, "Sync canceled", None);
                summary.canceled = true;
                break;
            }

            self.sync_group(group, &params, &mut summary).await;

            let processed = index + 1;
            if processed % progress_batch == 0 || processed == total {
                reporter.update_progress(processed, total, &format!("Synced {}/{}", processed, total));
            }
        }

        // A partial sync must not mark the export as seen
        if !summary.canceled {
            match LibraryFingerprint::compute(&request.library_path).await {
                Ok(fingerprint) => self.catalog.save_library_fingerprint(&fingerprint).await?,
                Err(e) => tracing::warn!(library = %import_source, error = %e, "Failed to fingerprint library export"),
            }
        }

        let message = summary.message();
        tracing::info!(library = %import_source, "{}", message);
        reporter.log(LogLevel::Info, &message, None);
        Ok(summary)
    }

    async fn sync_group(&self, group: &AlbumGroup, params: &JobParams, summary: &mut SyncSummary) {
        let Some(first) = group.authoritative() else {
            summary.skipped += 1;
            return;
        };
        if first.persistent_id.is_empty() {
            tracing::debug!(group = %group.key, "Skipping group without persistent id");
            summary.skipped += 1;
            return;
        }

        let result = match self.catalog.get_book_by_persistent_id(&first.persistent_id).await {
            Ok(Some(mut book)) => {
                if apply_mutable_fields(&mut book, first) {
                    self.catalog.update_book(&book).await.map(|_| SyncChange::Updated)
                } else {
                    Ok(SyncChange::Unchanged)
                }
            }
            Ok(None) => match build_candidate(group, params) {
                Ok(candidate) => self.pipeline.store_candidate(candidate).await.map(|_| SyncChange::New),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(SyncChange::Updated) => summary.updated += 1,
            Ok(SyncChange::Unchanged) => summary.unchanged += 1,
            Ok(SyncChange::New) => summary.new += 1,
            Err(e) => {
                tracing::warn!(group = %group.key, error = %e, "Failed to sync group");
                summary.record_failure(format!("{}: {}", group.key, e), self.tuning.error_limit);
            }
        }
    }
}

enum SyncChange {
    New,
    Updated,
    Unchanged,
}

/// Copy play count, rating, bookmark and last played; true if any differed
fn apply_mutable_fields(book: &mut CatalogBook, track: &Track) -> bool {
    let mut changed = false;

    if book.play_count != track.play_count {
        book.play_count = track.play_count;
        changed = true;
    }
    if book.rating != track.rating {
        book.rating = track.rating;
        changed = true;
    }
    if book.bookmark_ms != track.bookmark_ms {
        book.bookmark_ms = track.bookmark_ms;
        changed = true;
    }
    if book.last_played.map(|t| t.timestamp()) != track.last_played.map(|t| t.timestamp()) {
        book.last_played = track.last_played;
        changed = true;
    }

    changed
}
