//! Import, sync and write-back services
//!
//! Every service takes its catalog and collaborators as constructor
//! arguments; nothing reaches for process-wide state.

pub mod checkpoint;
pub mod collaborators;
pub mod import_pipeline;
pub mod job_executor;
pub mod sync_reconciler;
pub mod validation;
pub mod writeback;

pub use checkpoint::CheckpointStore;
pub use collaborators::{
    ContentHasher, JobReporter, LogLevel, MetadataEnricher, Organizer, ProgressReporter,
    Sha256Hasher,
};
pub use import_pipeline::{BookCandidate, GroupOutcome, ImportPipeline};
pub use job_executor::JobExecutor;
pub use sync_reconciler::{SyncReconciler, SyncRequest, SyncSummary};
pub use validation::{validate_export, ValidationReport};
pub use writeback::{
    ExportValidator, ReparseValidator, WriteBackBatcher, WriteBackEngine, WriteBackRequest,
    WriteBackResult, WriteBackUpdate,
};
