//! Library export fixtures
//!
//! Builds `Library.xml` documents in the player's plist layout.

use quick_xml::escape::escape;
use shelf_itunes::location::encode_location;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// One track entry
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: i64,
    pub persistent_id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub kind: String,
    pub track_number: u32,
    pub total_time_ms: i64,
    pub play_count: i64,
    /// Raw, percent-encoded location
    pub location: String,
}

impl TrackSpec {
    /// Audiobook track pointing at a local file
    pub fn audiobook(track_id: i64, persistent_id: &str, artist: &str, album: &str, path: &Path) -> Self {
        Self {
            track_id,
            persistent_id: persistent_id.to_string(),
            name: format!("{} {}", album, track_id),
            artist: artist.to_string(),
            album: album.to_string(),
            genre: "Audiobook".to_string(),
            kind: "AAC audio file".to_string(),
            track_number: 0,
            total_time_ms: 60_000,
            play_count: 0,
            location: encode_location(path),
        }
    }

    /// Music track (not long-form audio)
    pub fn song(track_id: i64, persistent_id: &str, path: &Path) -> Self {
        Self {
            genre: "Rock".to_string(),
            kind: "MPEG audio file".to_string(),
            ..Self::audiobook(track_id, persistent_id, "Band", "Album", path)
        }
    }

    pub fn track_number(mut self, number: u32) -> Self {
        self.track_number = number;
        self
    }

    pub fn play_count(mut self, count: i64) -> Self {
        self.play_count = count;
        self
    }

    pub fn raw_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportBuilder {
    tracks: Vec<TrackSpec>,
    playlists: Vec<(i64, String, Vec<i64>)>,
}

impl ExportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(mut self, track: TrackSpec) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn playlist(mut self, playlist_id: i64, name: &str, track_ids: &[i64]) -> Self {
        self.playlists.push((playlist_id, name.to_string(), track_ids.to_vec()));
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n");
        xml.push_str("<plist version=\"1.0\">\n<dict>\n");
        xml.push_str("\t<key>Major Version</key><integer>1</integer>\n");
        xml.push_str("\t<key>Minor Version</key><integer>1</integer>\n");
        xml.push_str("\t<key>Application Version</key><string>12.9.5.5</string>\n");
        xml.push_str("\t<key>Tracks</key>\n\t<dict>\n");

        for t in &self.tracks {
            let _ = writeln!(xml, "\t\t<key>{}</key>", t.track_id);
            xml.push_str("\t\t<dict>\n");
            let _ = writeln!(xml, "\t\t\t<key>Track ID</key><integer>{}</integer>", t.track_id);
            string_entry(&mut xml, "Persistent ID", &t.persistent_id);
            string_entry(&mut xml, "Name", &t.name);
            string_entry(&mut xml, "Artist", &t.artist);
            string_entry(&mut xml, "Album", &t.album);
            string_entry(&mut xml, "Genre", &t.genre);
            string_entry(&mut xml, "Kind", &t.kind);
            if t.track_number > 0 {
                let _ = writeln!(xml, "\t\t\t<key>Track Number</key><integer>{}</integer>", t.track_number);
            }
            let _ = writeln!(xml, "\t\t\t<key>Total Time</key><integer>{}</integer>", t.total_time_ms);
            if t.play_count > 0 {
                let _ = writeln!(xml, "\t\t\t<key>Play Count</key><integer>{}</integer>", t.play_count);
            }
            string_entry(&mut xml, "Location", &t.location);
            xml.push_str("\t\t</dict>\n");
        }
        xml.push_str("\t</dict>\n");

        xml.push_str("\t<key>Playlists</key>\n\t<array>\n");
        for (id, name, track_ids) in &self.playlists {
            xml.push_str("\t\t<dict>\n");
            let _ = writeln!(xml, "\t\t\t<key>Playlist ID</key><integer>{}</integer>", id);
            string_entry(&mut xml, "Name", name);
            xml.push_str("\t\t\t<key>Playlist Items</key>\n\t\t\t<array>\n");
            for track_id in track_ids {
                let _ = writeln!(
                    xml,
                    "\t\t\t\t<dict><key>Track ID</key><integer>{}</integer></dict>",
                    track_id
                );
            }
            xml.push_str("\t\t\t</array>\n\t\t</dict>\n");
        }
        xml.push_str("\t</array>\n</dict>\n</plist>\n");
        xml
    }

    /// Write the export to `path` and return it
    pub fn write(&self, path: &Path) -> PathBuf {
        std::fs::write(path, self.to_xml()).unwrap();
        path.to_path_buf()
    }
}

fn string_entry(xml: &mut String, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let _ = writeln!(xml, "\t\t\t<key>{}</key><string>{}</string>", key, escape(value));
}
