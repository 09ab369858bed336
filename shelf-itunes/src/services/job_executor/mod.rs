//! Checkpointed import job executor
//!
//! Runs one import job as a sequence of phases:
//!
//! IMPORTING → ENRICHING → ORGANIZING → COMPLETED
//!
//! Enriching and organizing only run when the job asks for them. Each phase
//! lives in its own `phase_*` module. Units of work (one album group, one
//! enrichment record, one organize record) are processed strictly in order so
//! a checkpoint index always means "the first N units are committed".
//!
//! # Cancellation
//! The reporter is polled before every unit. A canceled job saves the exact
//! committed position and keeps its stored state, so [`JobExecutor::resume`]
//! continues where it stopped.
//!
//! # Failure
//! Only an unreadable export or a store failure outside per-unit work is
//! fatal. The job's state is cleared and the error is returned.

use crate::catalog::CatalogStore;
use crate::export::load_library;
use crate::fingerprint::LibraryFingerprint;
use crate::grouper::group_tracks;
use crate::models::{
    Checkpoint, ImportStatus, ImportStatusHandle, JobOutcome, JobParams, JobPhase, JobState,
    JobStatusRegistry,
};
use crate::services::checkpoint::CheckpointStore;
use crate::services::collaborators::{
    ContentHasher, LogLevel, MetadataEnricher, Organizer, ProgressReporter,
};
use crate::services::import_pipeline::ImportPipeline;
use crate::{Error, Result};
use chrono::Utc;
use shelf_common::config::ImportTuning;
use shelf_common::events::{EventBus, ShelfEvent};
use std::sync::Arc;

mod phase_enriching;
mod phase_importing;
mod phase_organizing;

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseEnd {
    Finished,
    Canceled,
}

/// Everything a phase needs about the running job
struct JobContext<'a> {
    job_id: &'a str,
    params: &'a JobParams,
    reporter: &'a dyn ProgressReporter,
    status: &'a ImportStatusHandle,
}

pub struct JobExecutor {
    catalog: Arc<dyn CatalogStore>,
    pipeline: ImportPipeline,
    checkpoints: CheckpointStore,
    enricher: Option<Arc<dyn MetadataEnricher>>,
    organizer: Option<Arc<dyn Organizer>>,
    event_bus: Arc<EventBus>,
    registry: JobStatusRegistry,
    tuning: ImportTuning,
}

impl JobExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        hasher: Arc<dyn ContentHasher>,
        event_bus: Arc<EventBus>,
        registry: JobStatusRegistry,
        tuning: ImportTuning,
    ) -> Self {
        Self {
            pipeline: ImportPipeline::new(Arc::clone(&catalog), hasher),
            checkpoints: CheckpointStore::new(Arc::clone(&catalog)),
            catalog,
            enricher: None,
            organizer: None,
            event_bus,
            registry,
            tuning,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn MetadataEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_organizer(mut self, organizer: Arc<dyn Organizer>) -> Self {
        self.organizer = Some(organizer);
        self
    }

    pub fn registry(&self) -> &JobStatusRegistry {
        &self.registry
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Start (or restart) a job
    ///
    /// Parameters are stored once. If the job id already has parameters, the
    /// stored ones win and any stored checkpoint is honored.
    pub async fn run_import(
        &self,
        job_id: &str,
        params: JobParams,
        reporter: &dyn ProgressReporter,
    ) -> Result<JobOutcome> {
        let params = if self.checkpoints.save_params(job_id, &params).await? {
            params
        } else {
            tracing::warn!(job_id, "Job parameters already stored, using the original parameters");
            self.checkpoints
                .load_params(job_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?
        };

        let checkpoint = self.checkpoints.load_checkpoint(job_id).await?;
        self.execute(job_id, params, checkpoint, reporter).await
    }

    /// Continue a job from its stored parameters and checkpoint
    pub async fn resume(&self, job_id: &str, reporter: &dyn ProgressReporter) -> Result<JobOutcome> {
        let params = self
            .checkpoints
            .load_params(job_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        let checkpoint = self.checkpoints.load_checkpoint(job_id).await?;
        self.execute(job_id, params, checkpoint, reporter).await
    }

    async fn execute(
        &self,
        job_id: &str,
        params: JobParams,
        checkpoint: Option<Checkpoint>,
        reporter: &dyn ProgressReporter,
    ) -> Result<JobOutcome> {
        let status = self.registry.register(job_id, self.tuning.error_limit).await;
        let start_phase = checkpoint.map(|c| c.phase).unwrap_or(JobPhase::Importing);
        let mut state = JobState::Running(start_phase);

        tracing::info!(
            job_id,
            library = %params.library_path.display(),
            resumed = checkpoint.is_some(),
            phase = %start_phase,
            "Starting import job"
        );
        self.event_bus.emit_lossy(ShelfEvent::JobStarted {
            job_id: job_id.to_string(),
            library_path: params.import_source(),
            resumed: checkpoint.is_some(),
            timestamp: Utc::now(),
        });
        reporter.update_progress(0, 0, "Starting library import");

        let ctx = JobContext {
            job_id,
            params: &params,
            reporter,
            status: &status,
        };

        match self.run_phases(&ctx, checkpoint, &mut state).await {
            Ok(PhaseEnd::Finished) => {
                state.transition(JobState::Completed)?;
                self.checkpoints.clear_state(job_id).await?;
                self.save_fingerprint(&params).await;

                let snapshot = status.snapshot();
                let summary = snapshot.summary();
                reporter.update_progress(snapshot.total, snapshot.total, &summary);
                reporter.log(LogLevel::Info, &summary, None);
                Ok(self.finish(job_id, state, summary, snapshot))
            }
            Ok(PhaseEnd::Canceled) => {
                state.transition(JobState::Canceled)?;
                let snapshot = status.snapshot();
                let summary = format!(
                    "Import canceled: {} imported, {} skipped, {} failed",
                    snapshot.imported, snapshot.skipped, snapshot.failed
                );
                reporter.log(LogLevel::Info, &summary, None);
                Ok(self.finish(job_id, state, summary, snapshot))
            }
            Err(e) => {
                state = JobState::Failed;
                tracing::error!(job_id, error = %e, "Import job failed");
                reporter.log(LogLevel::Error, "Import failed", Some(&e.to_string()));

                if let Err(clear_err) = self.checkpoints.clear_state(job_id).await {
                    tracing::warn!(job_id, error = %clear_err, "Failed to clear job state");
                }

                self.finish(job_id, state, format!("Import failed: {}", e), status.snapshot());
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        ctx: &JobContext<'_>,
        checkpoint: Option<Checkpoint>,
        state: &mut JobState,
    ) -> Result<PhaseEnd> {
        let start_phase = checkpoint.map(|c| c.phase).unwrap_or(JobPhase::Importing);
        let resume_index = |phase: JobPhase| {
            checkpoint
                .filter(|c| c.phase == phase)
                .map(|c| c.index)
                .unwrap_or(0)
        };

        if start_phase == JobPhase::Importing {
            let library = load_library(&ctx.params.library_path).await?;
            let groups = group_tracks(&library.tracks);
            ctx.reporter.log(
                LogLevel::Info,
                &format!("Found {} audiobook groups to import", groups.len()),
                None,
            );

            let end = self
                .phase_importing(ctx, &groups, &library.playlists, resume_index(JobPhase::Importing))
                .await?;
            if end == PhaseEnd::Canceled {
                return Ok(end);
            }
        }

        if ctx.params.enrich_metadata && start_phase <= JobPhase::Enriching {
            if *state != JobState::Running(JobPhase::Enriching) {
                state.transition(JobState::Running(JobPhase::Enriching))?;
            }
            let end = self
                .phase_enriching(ctx, resume_index(JobPhase::Enriching))
                .await?;
            if end == PhaseEnd::Canceled {
                return Ok(end);
            }
        }

        if ctx.params.runs_organize() {
            if *state != JobState::Running(JobPhase::Organizing) {
                state.transition(JobState::Running(JobPhase::Organizing))?;
            }
            let end = self
                .phase_organizing(ctx, resume_index(JobPhase::Organizing))
                .await?;
            if end == PhaseEnd::Canceled {
                return Ok(end);
            }
        }

        Ok(PhaseEnd::Finished)
    }

    /// Persist a checkpoint every `checkpoint_batch` units
    async fn maybe_checkpoint(
        &self,
        ctx: &JobContext<'_>,
        phase: JobPhase,
        processed: usize,
        total: usize,
    ) -> Result<()> {
        if processed % self.tuning.checkpoint_batch.max(1) == 0 {
            self.checkpoints
                .save_checkpoint(
                    ctx.job_id,
                    Checkpoint {
                        phase,
                        index: processed,
                        total,
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Save the exact committed position before stopping on cancel
    async fn checkpoint_on_cancel(
        &self,
        ctx: &JobContext<'_>,
        phase: JobPhase,
        index: usize,
        total: usize,
    ) -> Result<PhaseEnd> {
        ctx.reporter.log(
            LogLevel::Info,
            &format!("Import canceled during {} at {}/{}", phase, index, total),
            None,
        );
        self.checkpoints
            .save_checkpoint(ctx.job_id, Checkpoint { phase, index, total })
            .await?;
        Ok(PhaseEnd::Canceled)
    }

    /// Report every `progress_batch` units and always on the last unit
    fn report_progress(&self, ctx: &JobContext<'_>, processed: usize, total: usize, message: &str) {
        if processed % self.tuning.progress_batch.max(1) == 0 || processed == total {
            ctx.reporter.update_progress(processed, total, message);
        }
    }

    async fn save_fingerprint(&self, params: &JobParams) {
        match LibraryFingerprint::compute(&params.library_path).await {
            Ok(fingerprint) => {
                if let Err(e) = self.catalog.save_library_fingerprint(&fingerprint).await {
                    tracing::warn!(error = %e, "Failed to store library fingerprint");
                }
            }
            Err(e) => tracing::warn!(
                library = %params.library_path.display(),
                error = %e,
                "Failed to fingerprint library export"
            ),
        }
    }

    fn finish(&self, job_id: &str, state: JobState, summary: String, status: ImportStatus) -> JobOutcome {
        tracing::info!(job_id, state = %state, summary = %summary, "Import job finished");
        self.event_bus.emit_lossy(ShelfEvent::JobFinished {
            job_id: job_id.to_string(),
            state: state.as_str().to_string(),
            summary: summary.clone(),
            timestamp: Utc::now(),
        });

        JobOutcome {
            job_id: job_id.to_string(),
            state,
            summary,
            status,
        }
    }
}
