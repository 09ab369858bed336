//! Debounced write-back
//!
//! Collects ids of books whose location changed and writes them back in one
//! pass once `write_back_delay_ms` passes with no further enqueue.
//! Batched writes never create a backup. With `itl_write_back` the binary
//! library is patched in the same pass.

use super::{WriteBackEngine, WriteBackRequest};
use shelf_common::config::{ItunesConfig, PathMapping};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct BatchTarget {
    library_path: PathBuf,
    path_mappings: Vec<PathMapping>,
    /// Binary library patched alongside the export
    itl_path: Option<PathBuf>,
}

struct BatcherInner {
    engine: Arc<WriteBackEngine>,
    target: Option<BatchTarget>,
    pending: Mutex<Vec<Uuid>>,
    notify: Notify,
}

impl BatcherInner {
    fn take_pending(&self) -> Vec<Uuid> {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *pending)
    }

    async fn flush(&self) {
        let Some(target) = &self.target else {
            return;
        };

        let mut ids = self.take_pending();
        if ids.is_empty() {
            return;
        }
        ids.sort();
        ids.dedup();

        let updates = match self.engine.updates_for_books(&ids).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, books = ids.len(), "Failed to build write-back updates");
                return;
            }
        };
        if updates.is_empty() {
            tracing::debug!(books = ids.len(), "No write-back updates in batch");
            return;
        }

        let request = WriteBackRequest {
            library_path: target.library_path.clone(),
            updates,
            create_backup: false,
            force_overwrite: false,
            path_mappings: target.path_mappings.clone(),
        };

        match self.engine.write_back(&request).await {
            Ok(result) => tracing::info!(updated = result.updated_count, "Batched write-back finished"),
            Err(e) if e.is_conflict() => {
                tracing::warn!(error = %e, "Batched write-back skipped, export changed externally")
            }
            Err(e) => tracing::warn!(error = %e, "Batched write-back failed"),
        }

        // Patched even when the export write failed
        if let Some(itl_path) = &target.itl_path {
            if let Err(e) = self
                .engine
                .write_back_itl(itl_path, &request.updates, &target.path_mappings)
                .await
            {
                tracing::warn!(itl = %itl_path.display(), error = %e, "Batched binary library write-back failed");
            }
        }
    }
}

/// Debounced write-back queue
///
/// Disabled (every call is a no-op) unless auto write-back is on and an
/// export path is configured.
pub struct WriteBackBatcher {
    inner: Arc<BatcherInner>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl WriteBackBatcher {
    pub fn spawn(engine: Arc<WriteBackEngine>, config: &ItunesConfig) -> Self {
        let target = match (&config.library_xml_path, config.auto_write_back) {
            (Some(path), true) => Some(BatchTarget {
                library_path: path.clone(),
                path_mappings: config.path_mappings.clone(),
                itl_path: config.itl_path.clone().filter(|_| config.itl_write_back),
            }),
            _ => None,
        };
        let enabled = target.is_some();

        let inner = Arc::new(BatcherInner {
            engine,
            target,
            pending: Mutex::new(Vec::new()),
            notify: Notify::new(),
        });
        let cancel = CancellationToken::new();

        let handle = enabled.then(|| {
            let inner = Arc::clone(&inner);
            let cancel = cancel.clone();
            let delay = Duration::from_millis(config.write_back_delay_ms);
            tokio::spawn(async move {
                'run: loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = inner.notify.notified() => {}
                    }
                    // Every enqueue restarts the quiet period
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break 'run,
                            _ = inner.notify.notified() => continue,
                            _ = tokio::time::sleep(delay) => break,
                        }
                    }
                    inner.flush().await;
                }
            })
        });

        Self { inner, cancel, handle }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.target.is_some()
    }

    /// Queue books for the next batch
    pub fn enqueue(&self, book_ids: impl IntoIterator<Item = Uuid>) {
        if !self.is_enabled() {
            return;
        }
        {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.extend(book_ids);
        }
        self.inner.notify.notify_one();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Stop the timer and flush whatever is pending
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.inner.flush().await;
    }
}
