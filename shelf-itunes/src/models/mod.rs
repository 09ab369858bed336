//! Data models for shelf-itunes

pub mod book;
pub mod job;
pub mod status;
pub mod track;

pub use book::{BookSegment, CatalogBook, LibraryState};
pub use job::{Checkpoint, ImportMode, JobOutcome, JobParams, JobPhase, JobState};
pub use status::{ImportStatus, ImportStatusHandle, JobStatusRegistry};
pub use track::{Playlist, Track};
