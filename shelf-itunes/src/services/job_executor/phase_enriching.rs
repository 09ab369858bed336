//! Phase 2: ENRICHING
//!
//! Calls the metadata enricher for every book this job's export imported that
//! is still in state `imported`. The external source is rate limited, so the
//! loop sleeps after a run of consecutive failures and after every fixed
//! number of successes.

use super::{JobContext, JobExecutor, PhaseEnd};
use crate::models::{JobPhase, LibraryState};
use crate::services::collaborators::LogLevel;
use crate::Result;
use std::time::Duration;

impl JobExecutor {
    pub(super) async fn phase_enriching(
        &self,
        ctx: &JobContext<'_>,
        start_index: usize,
    ) -> Result<PhaseEnd> {
        let Some(enricher) = self.enricher.as_ref() else {
            ctx.reporter.log(
                LogLevel::Warn,
                "Metadata enrichment requested but no enricher is configured",
                None,
            );
            return Ok(PhaseEnd::Finished);
        };

        let books = self
            .catalog
            .list_books_by_import_source(&ctx.params.import_source(), LibraryState::Imported)
            .await?;
        let total = books.len();
        let start_index = start_index.min(total);

        tracing::info!(job_id = ctx.job_id, total, start_index, "Phase 2: ENRICHING");

        let failure_threshold = self.tuning.enrich_failure_threshold.max(1);
        let pause_every = self.tuning.enrich_pause_every.max(1);
        let mut consecutive_failures = 0usize;
        let mut enriched = 0usize;

        for (index, book) in books.iter().enumerate().skip(start_index) {
            if ctx.reporter.is_canceled() {
                return self
                    .checkpoint_on_cancel(ctx, JobPhase::Enriching, index, total)
                    .await;
            }

            let result = match enricher.fetch_metadata_for_record(book.id).await {
                Ok(mut updated) => {
                    updated.id = book.id;
                    self.catalog.update_book(&updated).await.map_err(anyhow::Error::from)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    consecutive_failures = 0;
                    enriched += 1;
                    if enriched % pause_every == 0 {
                        tokio::time::sleep(Duration::from_millis(self.tuning.enrich_pause_ms)).await;
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(job_id = ctx.job_id, book_id = %book.id, error = %e, "Metadata enrichment failed");
                    ctx.reporter.log(
                        LogLevel::Warn,
                        &format!("Failed to enrich '{}'", book.title),
                        Some(&e.to_string()),
                    );
                    if consecutive_failures >= failure_threshold {
                        tracing::info!(
                            job_id = ctx.job_id,
                            consecutive_failures,
                            backoff_ms = self.tuning.enrich_failure_backoff_ms,
                            "Backing off metadata lookups"
                        );
                        tokio::time::sleep(Duration::from_millis(self.tuning.enrich_failure_backoff_ms)).await;
                        consecutive_failures = 0;
                    }
                }
            }

            let processed = index + 1;
            self.maybe_checkpoint(ctx, JobPhase::Enriching, processed, total)
                .await?;
            self.report_progress(
                ctx,
                processed,
                total,
                &format!("Enriched metadata {}/{}", processed, total),
            );
        }

        tracing::info!(job_id = ctx.job_id, enriched, total, "Metadata enrichment finished");
        Ok(PhaseEnd::Finished)
    }
}
