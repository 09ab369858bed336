//! Checkpoint store
//!
//! Job parameters and the last safe-to-resume position, persisted through the
//! catalog so they survive a process restart.

use crate::catalog::CatalogStore;
use crate::models::{Checkpoint, JobParams};
use crate::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct CheckpointStore {
    catalog: Arc<dyn CatalogStore>,
}

impl CheckpointStore {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Record the parameters a job started with
    ///
    /// Write-once: returns `false` and leaves the stored row untouched when the
    /// job already has parameters.
    pub async fn save_params(&self, job_id: &str, params: &JobParams) -> Result<bool> {
        let json = serde_json::to_string(params)?;
        self.catalog.save_operation_params(job_id, &json).await
    }

    pub async fn load_params(&self, job_id: &str) -> Result<Option<JobParams>> {
        match self.catalog.get_operation_params(job_id).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Overwrite the job's checkpoint
    pub async fn save_checkpoint(&self, job_id: &str, checkpoint: Checkpoint) -> Result<()> {
        let json = serde_json::to_string(&checkpoint)?;
        self.catalog.save_operation_state(job_id, &json).await?;

        tracing::debug!(
            job_id,
            phase = %checkpoint.phase,
            index = checkpoint.index,
            total = checkpoint.total,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Stored checkpoint, if any
    ///
    /// An unreadable checkpoint is treated as absent so the job restarts its
    /// phase from the beginning.
    pub async fn load_checkpoint(&self, job_id: &str) -> Result<Option<Checkpoint>> {
        let Some(json) = self.catalog.get_operation_state(job_id).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Ignoring unreadable checkpoint");
                Ok(None)
            }
        }
    }

    /// Drop params and checkpoint. Idempotent.
    pub async fn clear_state(&self, job_id: &str) -> Result<()> {
        self.catalog.delete_operation_state(job_id).await
    }
}
