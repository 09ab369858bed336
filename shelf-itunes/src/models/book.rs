//! Catalog records produced by import and sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Library lifecycle state of a catalog book
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryState {
    /// Imported in place, not yet reorganized
    #[default]
    Imported,
    /// Moved into the managed library layout
    Organized,
    /// Removed by the user
    Deleted,
}

impl LibraryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryState::Imported => "imported",
            LibraryState::Organized => "organized",
            LibraryState::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LibraryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imported" => Ok(LibraryState::Imported),
            "organized" => Ok(LibraryState::Organized),
            "deleted" => Ok(LibraryState::Deleted),
            other => Err(format!("unknown library state: {}", other)),
        }
    }
}

/// Persistent audiobook record
///
/// `file_path` is the single file for one-track books and the common parent
/// directory for multi-track books. Once `persistent_id` is set it is never
/// reassigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogBook {
    pub id: Uuid,
    pub title: String,
    pub file_path: String,
    pub format: String,
    pub duration_seconds: Option<i64>,
    pub total_size: Option<i64>,
    pub release_year: Option<i32>,
    pub narrator: Option<String>,
    pub edition: Option<String>,
    pub author_id: Option<i64>,
    pub series_id: Option<i64>,
    pub series_position: Option<i32>,
    pub persistent_id: Option<String>,
    pub play_count: i64,
    pub rating: i32,
    pub bookmark_ms: i64,
    pub last_played: Option<DateTime<Utc>>,
    pub date_added: Option<DateTime<Utc>>,
    pub file_hash: Option<String>,
    pub original_file_hash: Option<String>,
    pub organized_file_hash: Option<String>,
    pub library_state: LibraryState,
    /// Export file this book was imported from
    pub import_source: Option<String>,
}

impl CatalogBook {
    /// New book with a fresh id
    pub fn new(title: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    /// Persistent id when set and non-empty
    pub fn persistent_id(&self) -> Option<&str> {
        self.persistent_id.as_deref().filter(|pid| !pid.is_empty())
    }
}

/// One file of a multi-track book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSegment {
    pub id: Uuid,
    pub book_id: Uuid,
    pub file_path: String,
    pub format: String,
    pub size_bytes: i64,
    pub duration_seconds: i64,
    pub track_number: Option<u32>,
    pub total_tracks: Option<u32>,
    pub persistent_id: Option<String>,
}
