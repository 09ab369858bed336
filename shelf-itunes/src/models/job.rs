//! Import job parameters and state machine
//!
//! A job moves through `importing → enriching → organizing → completed`.
//! Optional phases may be skipped forward. `canceled` and `failed` are
//! reachable from any running phase; terminal states never transition.

use crate::models::ImportStatus;
use serde::{Deserialize, Serialize};
use shelf_common::config::PathMapping;
use std::fmt;
use std::path::PathBuf;

/// How imported files are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Files already live in the managed layout
    Organized,
    /// Catalog files where they are
    #[default]
    Import,
    /// Catalog, then reorganize into the managed layout
    Organize,
}

/// Immutable configuration a job was started with
///
/// Written once at job start and read back on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    pub library_path: PathBuf,
    #[serde(default)]
    pub import_mode: ImportMode,
    #[serde(default)]
    pub path_mappings: Vec<PathMapping>,
    #[serde(default)]
    pub skip_duplicates: bool,
    #[serde(default)]
    pub enrich_metadata: bool,
    #[serde(default)]
    pub auto_organize: bool,
    #[serde(default)]
    pub preserve_location: bool,
    #[serde(default)]
    pub import_playlists: bool,
}

impl JobParams {
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            import_mode: ImportMode::default(),
            path_mappings: Vec::new(),
            skip_duplicates: false,
            enrich_metadata: false,
            auto_organize: false,
            preserve_location: false,
            import_playlists: false,
        }
    }

    /// Reorganize phase runs unless suppressed by `preserve_location`
    pub fn runs_organize(&self) -> bool {
        (self.import_mode == ImportMode::Organize || self.auto_organize) && !self.preserve_location
    }

    /// Import-source marker stored on every book this job creates
    pub fn import_source(&self) -> String {
        self.library_path.to_string_lossy().into_owned()
    }
}

/// Checkpointed phase of a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Importing,
    Enriching,
    Organizing,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Importing => "importing",
            JobPhase::Enriching => "enriching",
            JobPhase::Organizing => "organizing",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last confirmed safe-to-resume position within a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub phase: JobPhase,
    pub index: usize,
    pub total: usize,
}

/// Job state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "lowercase")]
pub enum JobState {
    Running(JobPhase),
    Completed,
    Canceled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running(_))
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Running(current), JobState::Running(phase)) => phase > *current,
            (JobState::Running(_), _) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions
    pub fn transition(&mut self, next: JobState) -> crate::Result<()> {
        if !self.can_transition_to(next) {
            return Err(crate::Error::Internal(format!(
                "illegal job transition {} → {}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Running(phase) => phase.as_str(),
            JobState::Completed => "completed",
            JobState::Canceled => "canceled",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a job run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub state: JobState,
    /// Human-readable summary suitable for logs and API responses
    pub summary: String,
    pub status: ImportStatus,
}
