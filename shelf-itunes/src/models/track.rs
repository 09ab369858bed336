//! Export track and playlist records

use chrono::{DateTime, Utc};

/// One media entry from the library export
///
/// Missing or unparsable fields hold zero values. `parse_order` is the
/// track's position in the export document and breaks ordering ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub track_id: i64,
    pub persistent_id: String,
    pub name: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub genre: String,
    pub kind: String,
    pub disc_number: u32,
    pub track_number: u32,
    pub track_count: u32,
    /// Duration in milliseconds
    pub total_time_ms: i64,
    /// Size in bytes (0 when absent or out of range)
    pub size: i64,
    /// Raw `file://` location, still percent-encoded
    pub location: String,
    pub year: i32,
    pub play_count: i64,
    /// 0-100 scale
    pub rating: i32,
    /// Bookmark offset in milliseconds
    pub bookmark_ms: i64,
    pub last_played: Option<DateTime<Utc>>,
    pub date_added: Option<DateTime<Utc>>,
    pub comments: String,
    pub parse_order: usize,
}

/// A playlist and the track ids it contains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    pub playlist_id: i64,
    pub name: String,
    pub track_ids: Vec<i64>,
}
