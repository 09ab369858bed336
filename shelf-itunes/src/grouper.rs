//! Album grouper
//!
//! Folds long-form tracks into book-sized groups keyed by trimmed
//! `artist|album`. Groups come out in first-seen order and tracks within a
//! group are ordered by (disc, track, document order), so repeated runs over
//! the same export always produce the same sequence. The first track after
//! sorting is authoritative for book-level fields.

use crate::export::is_long_form_audio;
use crate::models::Track;
use std::collections::HashMap;

/// Tracks that make up one logical book
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumGroup {
    pub key: String,
    pub tracks: Vec<Track>,
}

impl AlbumGroup {
    /// Track whose fields stand for the whole book
    pub fn authoritative(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn is_multi_track(&self) -> bool {
        self.tracks.len() > 1
    }
}

/// Grouping key for a track
///
/// Empty albums fall back to the track title so single-file works still form
/// their own group; a track with neither falls back to its id.
pub fn group_key(track: &Track) -> String {
    let artist = track.artist.trim();
    let album = track.album.trim();
    let second = if !album.is_empty() {
        album.to_string()
    } else if !track.name.trim().is_empty() {
        track.name.trim().to_string()
    } else {
        format!("#{}", track.track_id)
    };
    format!("{}|{}", artist, second)
}

/// Group long-form tracks into ordered album groups
pub fn group_tracks<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> Vec<AlbumGroup> {
    let mut groups: Vec<AlbumGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for track in tracks.into_iter().filter(|t| is_long_form_audio(t)) {
        let key = group_key(track);
        match index.get(&key) {
            Some(&i) => groups[i].tracks.push(track.clone()),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(AlbumGroup {
                    key,
                    tracks: vec![track.clone()],
                });
            }
        }
    }

    for group in &mut groups {
        group
            .tracks
            .sort_by_key(|t| (t.disc_number, t.track_number, t.parse_order));
    }

    groups
}
