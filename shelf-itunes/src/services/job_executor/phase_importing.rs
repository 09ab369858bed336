//! Phase 1: IMPORTING
//!
//! One album group per unit. Groups before the resume index are assumed
//! committed and are not revisited.

use super::{JobContext, JobExecutor, PhaseEnd};
use crate::grouper::AlbumGroup;
use crate::models::{JobPhase, Playlist};
use crate::services::collaborators::LogLevel;
use crate::services::import_pipeline::GroupOutcome;
use crate::Result;

impl JobExecutor {
    pub(super) async fn phase_importing(
        &self,
        ctx: &JobContext<'_>,
        groups: &[AlbumGroup],
        playlists: &[Playlist],
        start_index: usize,
    ) -> Result<PhaseEnd> {
        let total = groups.len();
        let start_index = start_index.min(total);

        ctx.status.set_total(total);
        ctx.status.set_processed(start_index);

        tracing::info!(
            job_id = ctx.job_id,
            total,
            start_index,
            "Phase 1: IMPORTING"
        );

        for (index, group) in groups.iter().enumerate().skip(start_index) {
            if ctx.reporter.is_canceled() {
                return self
                    .checkpoint_on_cancel(ctx, JobPhase::Importing, index, total)
                    .await;
            }

            match self.pipeline.import_group(group, ctx.params, playlists).await {
                Ok(GroupOutcome::Imported(book_id)) => {
                    tracing::debug!(job_id = ctx.job_id, group = %group.key, %book_id, "Imported group");
                    ctx.status.record_imported();
                }
                Ok(GroupOutcome::Skipped(reason)) => {
                    tracing::debug!(job_id = ctx.job_id, group = %group.key, reason = %reason, "Skipped group");
                    ctx.reporter.log(LogLevel::Info, &format!("Skipping {}", group.key), Some(&reason));
                    ctx.status.record_skipped();
                }
                Err(e) => {
                    let message = format!("{}: {}", group.key, e);
                    tracing::warn!(job_id = ctx.job_id, group = %group.key, error = %e, "Failed to import group");
                    ctx.reporter.log(LogLevel::Warn, "Failed to import group", Some(&message));
                    ctx.status.record_failure(message);
                }
            }

            let processed = index + 1;
            ctx.status.set_processed(processed);
            self.maybe_checkpoint(ctx, JobPhase::Importing, processed, total)
                .await?;
            self.report_progress(ctx, processed, total, &ctx.status.snapshot().progress_message());
        }

        Ok(PhaseEnd::Finished)
    }
}
