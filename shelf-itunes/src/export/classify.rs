//! Track classification and playlist tagging

use crate::models::{Playlist, Track};

/// Playlists every export carries; never used as tags
const BUILT_IN_PLAYLISTS: &[&str] = &[
    "Music",
    "Movies",
    "TV Shows",
    "Podcasts",
    "Audiobooks",
    "iTunes U",
    "Books",
    "Genius",
    "Recently Added",
    "Recently Played",
    "Top 25 Most Played",
];

/// Whether a track is long-form spoken audio (an audiobook)
///
/// Checks kind, then genre, then location.
pub fn is_long_form_audio(track: &Track) -> bool {
    let kind = track.kind.to_lowercase();
    if kind.contains("audiobook") || kind.contains("spoken word") {
        return true;
    }

    let genre = track.genre.to_lowercase();
    if genre.contains("audiobook") || genre.contains("spoken") {
        return true;
    }

    if track.location.contains("Audiobooks") || track.location.contains("audiobooks") {
        return true;
    }

    track.location.to_lowercase().ends_with(".m4b")
}

pub fn is_built_in_playlist(name: &str) -> bool {
    BUILT_IN_PLAYLISTS.contains(&name)
}

/// Lowercased names of user playlists containing `track_id`
pub fn playlist_tags(track_id: i64, playlists: &[Playlist]) -> Vec<String> {
    playlists
        .iter()
        .filter(|p| !is_built_in_playlist(&p.name))
        .filter(|p| p.track_ids.contains(&track_id))
        .map(|p| p.name.to_lowercase())
        .collect()
}
