//! Per-job import counters
//!
//! [`ImportStatusHandle`] guards one job's [`ImportStatus`] with a mutex.
//! Readers get a deep copy so they never observe a half-applied update.
//! [`JobStatusRegistry`] is the injected lookup from job id to handle.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;

/// Snapshot of a job's counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStatus {
    pub total: usize,
    pub processed: usize,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Verbatim failure messages, capped at the handle's error limit
    pub errors: Vec<String>,
}

impl ImportStatus {
    /// Terminal summary line
    pub fn summary(&self) -> String {
        format!(
            "Import completed: {} imported, {} skipped, {} failed",
            self.imported, self.skipped, self.failed
        )
    }

    /// Batched progress line
    pub fn progress_message(&self) -> String {
        format!(
            "Processed {}/{} (imported {}, skipped {}, failed {})",
            self.processed, self.total, self.imported, self.skipped, self.failed
        )
    }
}

/// Mutex-guarded status for one job
#[derive(Debug)]
pub struct ImportStatusHandle {
    inner: Mutex<ImportStatus>,
    error_limit: usize,
}

impl ImportStatusHandle {
    pub fn new(error_limit: usize) -> Self {
        Self {
            inner: Mutex::new(ImportStatus::default()),
            error_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ImportStatus> {
        // Counters stay meaningful even if a holder panicked
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_total(&self, total: usize) {
        self.lock().total = total;
    }

    /// Mark units skipped over on resume as already processed
    pub fn set_processed(&self, processed: usize) {
        self.lock().processed = processed;
    }

    pub fn advance(&self) {
        self.lock().processed += 1;
    }

    pub fn record_imported(&self) {
        self.lock().imported += 1;
    }

    pub fn record_skipped(&self) {
        self.lock().skipped += 1;
    }

    /// Count a failure; the message is kept only while under the cap
    pub fn record_failure(&self, message: impl Into<String>) {
        let mut status = self.lock();
        status.failed += 1;
        if status.errors.len() < self.error_limit {
            status.errors.push(message.into());
        }
    }

    pub fn snapshot(&self) -> ImportStatus {
        self.lock().clone()
    }
}

/// Job id → status handle lookup shared by the executor and status pollers
#[derive(Debug, Clone, Default)]
pub struct JobStatusRegistry {
    jobs: Arc<RwLock<HashMap<String, Arc<ImportStatusHandle>>>>,
}

impl JobStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle for `job_id`, replacing any previous one
    pub async fn register(&self, job_id: &str, error_limit: usize) -> Arc<ImportStatusHandle> {
        let handle = Arc::new(ImportStatusHandle::new(error_limit));
        self.jobs
            .write()
            .await
            .insert(job_id.to_string(), Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, job_id: &str) -> Option<Arc<ImportStatusHandle>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Deep copy of the job's counters
    pub async fn snapshot(&self, job_id: &str) -> Option<ImportStatus> {
        self.get(job_id).await.map(|handle| handle.snapshot())
    }

    pub async fn remove(&self, job_id: &str) -> Option<Arc<ImportStatusHandle>> {
        self.jobs.write().await.remove(job_id)
    }
}
