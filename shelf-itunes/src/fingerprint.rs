//! Export file fingerprints
//!
//! A fingerprint is size + modification time + CRC32 checksum. The cheap
//! check compares size and mtime only; write-back additionally compares the
//! checksum before touching the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identity of an export file at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFingerprint {
    pub path: String,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    /// CRC32 of the full contents (0 for stat-only fingerprints)
    pub checksum: u32,
}

impl LibraryFingerprint {
    /// Full fingerprint including checksum, computed on the blocking pool
    pub async fn compute(path: &Path) -> std::io::Result<Self> {
        let path_buf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::compute_blocking(&path_buf))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }

    pub fn compute_blocking(path: &Path) -> std::io::Result<Self> {
        let mut fingerprint = Self::stat(path)?;

        let mut file = std::fs::File::open(path)?;
        let mut hasher = crc32fast::Hasher::new();
        let mut buffer = vec![0u8; 1024 * 1024]; // 1MB chunks
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        fingerprint.checksum = hasher.finalize();

        Ok(fingerprint)
    }

    /// Size and mtime only, checksum left at 0
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            mod_time: DateTime::<Utc>::from(metadata.modified()?),
            checksum: 0,
        })
    }

    /// Cheap equality: size and modification time
    pub fn matches(&self, other: &LibraryFingerprint) -> bool {
        self.size == other.size && self.mod_time == other.mod_time
    }

    /// Strong equality: also compares checksums
    pub fn matches_strict(&self, other: &LibraryFingerprint) -> bool {
        self.matches(other) && self.checksum == other.checksum
    }
}

/// The export changed since the stored fingerprint was taken
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "library export has been modified externally (size: {}→{}, mtime: {}→{})",
    .stored.size,
    .current.size,
    .stored.mod_time.to_rfc3339(),
    .current.mod_time.to_rfc3339()
)]
pub struct LibraryModified {
    pub stored: LibraryFingerprint,
    pub current: LibraryFingerprint,
}

#[derive(Debug, Default)]
struct WatchState {
    changed: bool,
    changed_at: Option<DateTime<Utc>>,
}

/// Polls an export for external changes using the cheap fingerprint check
pub struct LibraryWatcher {
    path: PathBuf,
    state: Arc<Mutex<WatchState>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LibraryWatcher {
    /// Start polling `path` every `interval`
    ///
    /// The first poll records the baseline; later polls flag a change when
    /// size or mtime differ from the previous poll.
    pub fn spawn(path: impl Into<PathBuf>, interval: Duration) -> Self {
        let path = path.into();
        let state = Arc::new(Mutex::new(WatchState::default()));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let path = path.clone();
            let state = Arc::clone(&state);
            let cancel = cancel.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                let mut baseline: Option<LibraryFingerprint> = None;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    let current = match LibraryFingerprint::stat(&path) {
                        Ok(fp) => fp,
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Library watcher stat failed");
                            continue;
                        }
                    };

                    if let Some(previous) = &baseline {
                        if !previous.matches(&current) {
                            tracing::info!(path = %path.display(), "Library export changed");
                            let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
                            state.changed = true;
                            state.changed_at = Some(Utc::now());
                        }
                    }
                    baseline = Some(current);
                }
            }
        });

        Self {
            path,
            state,
            cancel,
            handle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the export changed since the last [`clear_changed`](Self::clear_changed)
    pub fn has_changed(&self) -> bool {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).changed
    }

    pub fn changed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).changed_at
    }

    /// Reset the change flag (after an import or write-back)
    pub fn clear_changed(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.changed = false;
        state.changed_at = None;
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
