//! Pre-import validation report
//!
//! Answers "what would an import see?" without touching the catalog: how many
//! long-form tracks and groups the export holds, and how many of their files
//! actually exist after path remapping.

use crate::export::{is_long_form_audio, load_library};
use crate::grouper::group_tracks;
use crate::location::{decode_location, extract_path_prefixes, remap};
use crate::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use shelf_common::config::PathMapping;
use std::path::{Path, PathBuf};

/// Concurrent file existence checks
const EXISTENCE_CHECK_WORKERS: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total_tracks: usize,
    pub audiobook_tracks: usize,
    pub groups: usize,
    pub files_found: usize,
    pub files_missing: usize,
    /// Decoded path, or the raw location when it could not be decoded
    pub missing_paths: Vec<String>,
    /// Distinct location prefixes, for building path mappings
    pub path_prefixes: Vec<String>,
    pub estimated_time: String,
}

/// Build a validation report for an export
pub async fn validate_export(library_path: &Path, mappings: &[PathMapping]) -> Result<ValidationReport> {
    let library = load_library(library_path).await?;

    let audiobooks: Vec<_> = library.tracks.iter().filter(|t| is_long_form_audio(t)).collect();
    let groups = group_tracks(audiobooks.iter().copied()).len();

    tracing::info!(
        library = %library_path.display(),
        tracks = library.tracks.len(),
        audiobooks = audiobooks.len(),
        workers = EXISTENCE_CHECK_WORKERS,
        "Checking audiobook file existence"
    );

    let checks: Vec<(usize, String, Option<PathBuf>)> = audiobooks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let path = decode_location(&remap(&track.location, mappings)).ok();
            (i, track.location.clone(), path)
        })
        .collect();

    let mut results: Vec<(usize, bool, String)> = stream::iter(checks)
        .map(|(i, raw, path)| async move {
            match path {
                Some(path) => {
                    let found = tokio::fs::metadata(&path).await.is_ok();
                    (i, found, path.to_string_lossy().into_owned())
                }
                None => (i, false, raw),
            }
        })
        .buffer_unordered(EXISTENCE_CHECK_WORKERS)
        .collect()
        .await;
    results.sort_by_key(|(i, _, _)| *i);

    let files_found = results.iter().filter(|(_, found, _)| *found).count();
    let missing_paths: Vec<String> = results
        .into_iter()
        .filter(|(_, found, _)| !found)
        .map(|(_, _, path)| path)
        .collect();

    Ok(ValidationReport {
        total_tracks: library.tracks.len(),
        audiobook_tracks: audiobooks.len(),
        groups,
        files_found,
        files_missing: missing_paths.len(),
        missing_paths,
        path_prefixes: extract_path_prefixes(audiobooks.iter().map(|t| t.location.as_str())),
        estimated_time: estimate_import_time(files_found),
    })
}

/// Rough import time at one second per book file
pub fn estimate_import_time(files: usize) -> String {
    let seconds = files;
    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", seconds / 60)
    } else {
        format!("{} hours {} minutes", seconds / 3600, (seconds % 3600) / 60)
    }
}
