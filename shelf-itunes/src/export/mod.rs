//! Library export parser
//!
//! Reads the media player's XML property list export into [`Track`]s and
//! [`Playlist`]s. Individual fields are read leniently: a missing or garbled
//! value becomes its zero value and never fails the parse. Only a document
//! that is unreadable or structurally malformed produces a [`ParseError`].

mod classify;
pub(crate) mod plist;

pub use classify::{is_built_in_playlist, is_long_form_audio, playlist_tags};

use crate::models::{Playlist, Track};
use chrono::{DateTime, TimeZone, Utc};
use plist::PlistValue;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Seconds between the classic Mac epoch (1904) and the Unix epoch
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// Export parse failure
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("XML error at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("malformed export: {0}")]
    Malformed(String),
}

/// Byte range of one track's raw `Location` value in the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocationSpan {
    pub persistent_id: String,
    pub range: Range<usize>,
}

/// Parsed library export
#[derive(Debug, Clone, Default)]
pub struct ExportLibrary {
    pub major_version: i64,
    pub minor_version: i64,
    pub application_version: String,
    pub music_folder: String,
    /// Tracks in document order
    pub tracks: Vec<Track>,
    pub playlists: Vec<Playlist>,
    pub(crate) location_spans: Vec<LocationSpan>,
}

impl ExportLibrary {
    pub fn track_by_persistent_id(&self, persistent_id: &str) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| !t.persistent_id.is_empty() && t.persistent_id == persistent_id)
    }

    /// Lowercased user playlist names containing the track
    pub fn playlist_tags(&self, track_id: i64) -> Vec<String> {
        playlist_tags(track_id, &self.playlists)
    }
}

/// Parse an export file from disk
pub fn parse_library(path: &Path) -> Result<ExportLibrary, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))?;
    parse_str(&text)
}

/// Parse an export file on the blocking pool
///
/// Large exports take long enough to parse that they should not run on an
/// async worker thread.
pub async fn load_library(path: &Path) -> Result<ExportLibrary, ParseError> {
    let path_buf = path.to_path_buf();
    tokio::task::spawn_blocking(move || parse_library(&path_buf))
        .await
        .map_err(|e| ParseError::Malformed(format!("parse task failed: {}", e)))?
}

/// Parse export text
pub fn parse_str(xml: &str) -> Result<ExportLibrary, ParseError> {
    let root = plist::parse_document(xml)?;
    if root.as_dict().is_none() {
        return Err(ParseError::Malformed("root value is not a dict".to_string()));
    }

    let mut library = ExportLibrary {
        major_version: int_field(&root, "Major Version"),
        minor_version: int_field(&root, "Minor Version"),
        application_version: string_field(&root, "Application Version"),
        music_folder: string_field(&root, "Music Folder"),
        ..ExportLibrary::default()
    };

    if let Some(tracks) = root.get("Tracks") {
        let entries = tracks
            .as_dict()
            .ok_or_else(|| ParseError::Malformed("'Tracks' is not a dict".to_string()))?;

        for (key, value) in entries {
            if value.as_dict().is_none() {
                tracing::debug!(track_key = %key, "Skipping non-dict track entry");
                continue;
            }
            let parse_order = library.tracks.len();
            let track = track_from_dict(key, value, parse_order);

            if let Some(PlistValue::String { span: Some(range), .. }) = value.get("Location") {
                if !track.persistent_id.is_empty() {
                    library.location_spans.push(LocationSpan {
                        persistent_id: track.persistent_id.clone(),
                        range: range.clone(),
                    });
                }
            }
            library.tracks.push(track);
        }
    }

    if let Some(playlists) = root.get("Playlists").and_then(|p| p.as_array()) {
        for value in playlists {
            let Some(items) = value.get("Playlist Items").and_then(|i| i.as_array()) else {
                continue;
            };
            library.playlists.push(Playlist {
                playlist_id: int_field(value, "Playlist ID"),
                name: string_field(value, "Name"),
                track_ids: items.iter().map(|item| int_field(item, "Track ID")).collect(),
            });
        }
    }

    tracing::debug!(
        tracks = library.tracks.len(),
        playlists = library.playlists.len(),
        "Parsed library export"
    );

    Ok(library)
}

fn track_from_dict(key: &str, dict: &PlistValue, parse_order: usize) -> Track {
    let track_id = dict
        .get("Track ID")
        .and_then(|v| v.as_i64())
        .or_else(|| key.parse().ok())
        .unwrap_or(0);

    let last_played = dict
        .get("Play Date UTC")
        .and_then(|v| v.as_date())
        .and_then(parse_date)
        .or_else(|| {
            let seconds = int_field(dict, "Play Date");
            (seconds > MAC_EPOCH_OFFSET)
                .then(|| Utc.timestamp_opt(seconds - MAC_EPOCH_OFFSET, 0).single())
                .flatten()
        });

    Track {
        track_id,
        persistent_id: string_field(dict, "Persistent ID"),
        name: string_field(dict, "Name"),
        artist: string_field(dict, "Artist"),
        album_artist: string_field(dict, "Album Artist"),
        album: string_field(dict, "Album"),
        genre: string_field(dict, "Genre"),
        kind: string_field(dict, "Kind"),
        disc_number: u32_field(dict, "Disc Number"),
        track_number: u32_field(dict, "Track Number"),
        track_count: u32_field(dict, "Track Count"),
        total_time_ms: int_field(dict, "Total Time").max(0),
        // Sizes beyond i64 fail to parse and land here as 0
        size: int_field(dict, "Size").max(0),
        location: string_field(dict, "Location"),
        year: i32::try_from(int_field(dict, "Year")).unwrap_or(0),
        play_count: int_field(dict, "Play Count").max(0),
        rating: i32::try_from(int_field(dict, "Rating")).unwrap_or(0),
        bookmark_ms: int_field(dict, "Bookmark").max(0),
        last_played,
        date_added: dict
            .get("Date Added")
            .and_then(|v| v.as_date())
            .and_then(parse_date),
        comments: string_field(dict, "Comments"),
        parse_order,
    }
}

fn string_field(dict: &PlistValue, key: &str) -> String {
    dict.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn int_field(dict: &PlistValue, key: &str) -> i64 {
    dict.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn u32_field(dict: &PlistValue, key: &str) -> u32 {
    u32::try_from(int_field(dict, key)).unwrap_or(0)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Look for an export in the platform's usual places
pub fn find_library_file() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    [
        home.join("Music").join("Music").join("Library.xml"),
        home.join("Music").join("iTunes").join("iTunes Music Library.xml"),
        home.join("Music").join("iTunes").join("iTunes Library.xml"),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}
