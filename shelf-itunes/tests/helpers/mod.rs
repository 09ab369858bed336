//! Test Helper Utilities
//!
//! Shared utilities for testing shelf-itunes

pub mod db_utils;
pub mod export_builder;
pub mod fakes;
pub mod itl_builder;

// Re-export commonly used items
pub use db_utils::{create_test_catalog, write_book_file};
pub use export_builder::{ExportBuilder, TrackSpec};
pub use fakes::{
    FailingValidator, FakeEnricher, FakeOrganizer, RecordingReporter,
};
pub use itl_builder::{itl_track, write_itl};
