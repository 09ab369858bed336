//! Phase 3: ORGANIZING
//!
//! Hands every `imported` book from this job's export to the organizer and
//! records the returned path. Organized books leave the candidate list, so a
//! resumed phase re-lists the remaining books and only uses the stored index
//! to keep progress numbering continuous.
//!
//! Segment paths follow the book: a segment under the old book directory is
//! re-rooted under the returned path with its relative part kept.

use super::{JobContext, JobExecutor, PhaseEnd};
use crate::models::{CatalogBook, JobPhase, LibraryState};
use crate::services::collaborators::LogLevel;
use crate::Result;
use std::path::Path;

impl JobExecutor {
    pub(super) async fn phase_organizing(
        &self,
        ctx: &JobContext<'_>,
        resume_offset: usize,
    ) -> Result<PhaseEnd> {
        let Some(organizer) = self.organizer.as_ref() else {
            ctx.reporter.log(
                LogLevel::Warn,
                "Reorganize requested but no organizer is configured",
                None,
            );
            return Ok(PhaseEnd::Finished);
        };

        let books = self
            .catalog
            .list_books_by_import_source(&ctx.params.import_source(), LibraryState::Imported)
            .await?;
        let total = resume_offset + books.len();

        tracing::info!(job_id = ctx.job_id, total, resume_offset, "Phase 3: ORGANIZING");

        let mut organized = 0usize;
        for (i, mut book) in books.into_iter().enumerate() {
            let index = resume_offset + i;
            if ctx.reporter.is_canceled() {
                return self
                    .checkpoint_on_cancel(ctx, JobPhase::Organizing, index, total)
                    .await;
            }

            match organizer.organize_book(&book).await {
                Ok(new_path) => {
                    let old_path = std::mem::take(&mut book.file_path);
                    book.file_path = if new_path.is_empty() { old_path.clone() } else { new_path };
                    book.library_state = LibraryState::Organized;

                    let saved = match self.move_segments(&book, &old_path).await {
                        Ok(()) => self.catalog.update_book(&book).await,
                        Err(e) => Err(e),
                    };
                    match saved {
                        Ok(()) => organized += 1,
                        Err(e) => {
                            let message = format!("Failed to update organized path for '{}': {}", book.title, e);
                            ctx.reporter.log(LogLevel::Warn, &message, None);
                            ctx.status.record_failure(message);
                        }
                    }
                }
                Err(e) => {
                    let message = format!("Failed to organize '{}': {}", book.title, e);
                    tracing::warn!(job_id = ctx.job_id, book_id = %book.id, error = %e, "Organize failed");
                    ctx.reporter.log(LogLevel::Warn, &message, None);
                    ctx.status.record_failure(message);
                }
            }

            let processed = index + 1;
            self.maybe_checkpoint(ctx, JobPhase::Organizing, processed, total)
                .await?;
            self.report_progress(
                ctx,
                processed,
                total,
                &format!("Organized {}/{}", processed, total),
            );
        }

        tracing::info!(job_id = ctx.job_id, organized, total, "Reorganize finished");
        Ok(PhaseEnd::Finished)
    }

    async fn move_segments(&self, book: &CatalogBook, old_path: &str) -> Result<()> {
        if book.file_path == old_path {
            return Ok(());
        }
        for segment in self.catalog.list_segments(book.id).await? {
            match reroot(&segment.file_path, old_path, &book.file_path) {
                Some(path) => self.catalog.update_segment_path(segment.id, &path).await?,
                None => tracing::debug!(
                    book_id = %book.id,
                    segment = %segment.file_path,
                    "Segment outside book directory, path kept"
                ),
            }
        }
        Ok(())
    }
}

/// `path` moved from under `old_root` to under `new_root`
fn reroot(path: &str, old_root: &str, new_root: &str) -> Option<String> {
    if path == old_root {
        return Some(new_root.to_string());
    }
    let relative = Path::new(path).strip_prefix(old_root).ok()?;
    Some(Path::new(new_root).join(relative).to_string_lossy().into_owned())
}
