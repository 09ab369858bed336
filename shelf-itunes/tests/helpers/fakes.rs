//! In-memory collaborators for driving the executor and write-back engine

use async_trait::async_trait;
use shelf_itunes::catalog::CatalogStore;
use shelf_itunes::models::CatalogBook;
use shelf_itunes::services::{ExportValidator, LogLevel, MetadataEnricher, Organizer, ProgressReporter};
use shelf_itunes::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Records every log line and progress update
///
/// With `cancel_after(n)` the reporter answers "not canceled" to the first
/// `n` polls and "canceled" afterwards, so exactly `n` units run.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    logs: Mutex<Vec<(LogLevel, String)>>,
    progress: Mutex<Vec<(usize, usize, String)>>,
    polls: AtomicUsize,
    cancel_after: Option<usize>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_after(units: usize) -> Self {
        Self {
            cancel_after: Some(units),
            ..Self::default()
        }
    }

    pub fn logs(&self) -> Vec<(LogLevel, String)> {
        self.logs.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(usize, usize, String)> {
        self.progress.lock().unwrap().clone()
    }

    pub fn has_log_containing(&self, text: &str) -> bool {
        self.logs().iter().any(|(_, message)| message.contains(text))
    }
}

impl ProgressReporter for RecordingReporter {
    fn log(&self, level: LogLevel, message: &str, _detail: Option<&str>) {
        self.logs.lock().unwrap().push((level, message.to_string()));
    }

    fn update_progress(&self, current: usize, total: usize, message: &str) {
        self.progress
            .lock()
            .unwrap()
            .push((current, total, message.to_string()));
    }

    fn is_canceled(&self) -> bool {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst);
        matches!(self.cancel_after, Some(limit) if polls >= limit)
    }
}

/// Enricher that fills the narrator from the catalog record
pub struct FakeEnricher {
    catalog: Arc<dyn CatalogStore>,
    pub narrator: String,
    pub calls: AtomicUsize,
}

impl FakeEnricher {
    pub fn new(catalog: Arc<dyn CatalogStore>, narrator: &str) -> Self {
        Self {
            catalog,
            narrator: narrator.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetadataEnricher for FakeEnricher {
    async fn fetch_metadata_for_record(&self, book_id: Uuid) -> anyhow::Result<CatalogBook> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut book = self
            .catalog
            .get_book(book_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("book {} not found", book_id))?;
        book.narrator = Some(self.narrator.clone());
        Ok(book)
    }
}

/// Organizer that "moves" books under a fixed root without touching disk
///
/// Titles listed in `fail_titles` fail.
pub struct FakeOrganizer {
    pub root: String,
    pub fail_titles: Vec<String>,
    pub moved: Mutex<HashMap<Uuid, String>>,
    pub calls: AtomicUsize,
}

impl FakeOrganizer {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            fail_titles: Vec::new(),
            moved: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, title: &str) -> Self {
        self.fail_titles.push(title.to_string());
        self
    }
}

#[async_trait]
impl Organizer for FakeOrganizer {
    async fn organize_book(&self, book: &CatalogBook) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_titles.contains(&book.title) {
            anyhow::bail!("disk full while moving {}", book.title);
        }
        let new_path = format!("{}/{}", self.root, book.title);
        self.moved.lock().unwrap().insert(book.id, new_path.clone());
        Ok(new_path)
    }
}

/// Validator that rejects every rewritten export
#[derive(Debug, Default)]
pub struct FailingValidator;

impl ExportValidator for FailingValidator {
    fn validate(&self, _path: &Path, _expected: &HashMap<String, String>) -> Result<()> {
        Err(Error::Validation("rejected by test validator".to_string()))
    }
}
