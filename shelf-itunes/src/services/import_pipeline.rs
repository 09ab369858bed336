//! Import pipeline
//!
//! Turns one [`AlbumGroup`] into catalog records. The authoritative (first)
//! track supplies book-level fields; duration and size are summed over every
//! member track. Multi-track groups are stored under their common parent
//! directory with one segment per track.
//!
//! Skip checks run in this order: blocked hash, duplicate path or hash (only
//! when dedup is requested), persistent id already in the catalog.

use crate::catalog::CatalogStore;
use crate::export::playlist_tags;
use crate::grouper::AlbumGroup;
use crate::location::{decode_location, remap};
use crate::models::{BookSegment, CatalogBook, ImportMode, JobParams, LibraryState, Playlist, Track};
use crate::services::collaborators::ContentHasher;
use crate::{Error, Result};
use shelf_common::config::PathMapping;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Result of importing one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Imported(Uuid),
    Skipped(String),
}

/// Book and segments built from a group, not yet stored
#[derive(Debug, Clone)]
pub struct BookCandidate {
    pub book: CatalogBook,
    pub segments: Vec<BookSegment>,
    /// Resolved file of the authoritative track
    pub first_file: PathBuf,
    pub author_name: Option<String>,
    /// Series name and numeric position
    pub series: Option<(String, Option<i32>)>,
}

pub struct ImportPipeline {
    catalog: Arc<dyn CatalogStore>,
    hasher: Arc<dyn ContentHasher>,
}

impl ImportPipeline {
    pub fn new(catalog: Arc<dyn CatalogStore>, hasher: Arc<dyn ContentHasher>) -> Self {
        Self { catalog, hasher }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    /// Import one group, applying the skip checks
    pub async fn import_group(
        &self,
        group: &AlbumGroup,
        params: &JobParams,
        playlists: &[Playlist],
    ) -> Result<GroupOutcome> {
        let mut candidate = build_candidate(group, params)?;

        let hash = match self.hasher.compute_file_hash(&candidate.first_file).await {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(
                    file = %candidate.first_file.display(),
                    error = %e,
                    "Failed to hash file, continuing without dedup hash"
                );
                None
            }
        };

        if let Some(hash) = &hash {
            if self.catalog.is_hash_blocked(hash).await? {
                return Ok(GroupOutcome::Skipped(format!(
                    "blocked content hash for {}",
                    candidate.book.title
                )));
            }
        }

        if params.skip_duplicates {
            if self
                .catalog
                .get_book_by_file_path(&candidate.book.file_path)
                .await?
                .is_some()
            {
                return Ok(GroupOutcome::Skipped(format!(
                    "duplicate path {}",
                    candidate.book.file_path
                )));
            }
            if let Some(hash) = &hash {
                if let Some(existing) = self.catalog.get_book_by_file_hash(hash).await? {
                    return Ok(GroupOutcome::Skipped(format!(
                        "duplicate content of {}",
                        existing.title
                    )));
                }
            }
        }

        if let Some(pid) = candidate.book.persistent_id() {
            if self.catalog.get_book_by_persistent_id(pid).await?.is_some() {
                return Ok(GroupOutcome::Skipped(format!("persistent id {} already imported", pid)));
            }
        }

        candidate.book.file_hash = hash.clone();
        candidate.book.original_file_hash = hash.clone();
        if params.import_mode == ImportMode::Organized {
            candidate.book.organized_file_hash = hash;
        }

        if params.import_playlists {
            if let Some(first) = group.authoritative() {
                let tags = playlist_tags(first.track_id, playlists);
                if !tags.is_empty() {
                    tracing::info!(title = %candidate.book.title, tags = ?tags, "Playlist tags");
                }
            }
        }

        let id = self.store_candidate(candidate).await?;
        Ok(GroupOutcome::Imported(id))
    }

    /// Create the book, its segments and author/series links
    pub async fn store_candidate(&self, candidate: BookCandidate) -> Result<Uuid> {
        let BookCandidate {
            mut book,
            segments,
            author_name,
            series,
            ..
        } = candidate;

        if let Some(name) = &author_name {
            match self.catalog.get_or_create_author_by_name(name).await {
                Ok(author_id) => book.author_id = Some(author_id),
                Err(e) => tracing::warn!(author = %name, error = %e, "Failed to link author"),
            }
        }

        if let Some((name, position)) = &series {
            match self.catalog.get_or_create_series_by_name(name, book.author_id).await {
                Ok(series_id) => {
                    book.series_id = Some(series_id);
                    book.series_position = *position;
                }
                Err(e) => tracing::warn!(series = %name, error = %e, "Failed to link series"),
            }
        }

        self.catalog.create_book(&book).await?;

        for mut segment in segments {
            segment.book_id = book.id;
            self.catalog.create_segment(&segment).await?;
        }

        if let Some(author_id) = book.author_id {
            self.catalog.set_book_authors(book.id, &[author_id]).await?;
        }

        tracing::debug!(book_id = %book.id, title = %book.title, path = %book.file_path, "Created book");
        Ok(book.id)
    }
}

/// Build a book candidate from a group's tracks
///
/// Fails with [`Error::MissingFile`] when the authoritative track's file does
/// not exist, or a decode error when its location is unusable.
pub fn build_candidate(group: &AlbumGroup, params: &JobParams) -> Result<BookCandidate> {
    let first = group
        .authoritative()
        .ok_or_else(|| Error::Validation(format!("group {} has no tracks", group.key)))?;

    let first_file = resolve_track_path(first, &params.path_mappings)?;
    let metadata = std::fs::metadata(&first_file).map_err(|_| Error::MissingFile(first_file.clone()))?;

    let mut segments = Vec::new();
    let mut member_paths = vec![first_file.clone()];
    if group.is_multi_track() {
        let total_tracks = group.tracks.len() as u32;
        for track in &group.tracks {
            let path = if track.track_id == first.track_id {
                first_file.clone()
            } else {
                match resolve_track_path(track, &params.path_mappings) {
                    Ok(path) => {
                        member_paths.push(path.clone());
                        path
                    }
                    Err(e) => {
                        tracing::warn!(track_id = track.track_id, error = %e, "Skipping segment with unusable location");
                        continue;
                    }
                }
            };
            segments.push(BookSegment {
                id: Uuid::new_v4(),
                book_id: Uuid::nil(),
                file_path: path.to_string_lossy().into_owned(),
                format: file_format(&path),
                size_bytes: track.size.max(0),
                duration_seconds: track.total_time_ms.max(0) / 1000,
                track_number: (track.track_number > 0).then_some(track.track_number),
                total_tracks: Some(if track.track_count > 0 { track.track_count } else { total_tracks }),
                persistent_id: non_empty(&track.persistent_id),
            });
        }
    }

    let book_path = if group.is_multi_track() {
        common_parent(&member_paths)
    } else {
        first_file.clone()
    };

    let total_ms: i64 = group.tracks.iter().map(|t| t.total_time_ms.max(0)).sum();
    let mut total_size: i64 = group.tracks.iter().map(|t| t.size.max(0)).sum();
    if total_size == 0 {
        total_size = i64::try_from(metadata.len()).unwrap_or(0);
    }

    let mut book = CatalogBook::new(book_title(group, first, &first_file), book_path.to_string_lossy());
    book.format = file_format(&first_file);
    book.duration_seconds = (total_ms > 0).then_some(total_ms / 1000);
    book.total_size = (total_size > 0).then_some(total_size);
    book.release_year = (first.year > 0).then_some(first.year);
    book.persistent_id = non_empty(&first.persistent_id);
    book.play_count = first.play_count;
    book.rating = first.rating;
    book.bookmark_ms = first.bookmark_ms;
    book.last_played = first.last_played;
    book.date_added = first.date_added;
    book.import_source = Some(params.import_source());
    book.library_state = match params.import_mode {
        ImportMode::Organized => LibraryState::Organized,
        _ => LibraryState::Imported,
    };

    let artist = first.artist.trim();
    let album_artist = first.album_artist.trim();
    if !album_artist.is_empty() && album_artist != artist {
        book.narrator = Some(album_artist.to_string());
    }
    book.edition = non_empty(first.comments.trim());

    Ok(BookCandidate {
        book,
        segments,
        first_file,
        author_name: non_empty(artist),
        series: parse_series(&first.album),
    })
}

/// Remap then decode a track's raw location
pub fn resolve_track_path(track: &Track, mappings: &[PathMapping]) -> Result<PathBuf> {
    let raw = remap(&track.location, mappings);
    Ok(decode_location(&raw)?)
}

/// Series name and position from an album title
///
/// An album that splits into exactly two parts on `,`, then `-`, then `:`
/// names its series with the first part; a number in the second part is the
/// position. Any other album is its own series.
pub fn parse_series(album: &str) -> Option<(String, Option<i32>)> {
    let album = album.trim();
    if album.is_empty() {
        return None;
    }

    for separator in [',', '-', ':'] {
        let parts: Vec<&str> = album.split(separator).collect();
        if parts.len() == 2 {
            let name = parts[0].trim();
            if name.is_empty() {
                break;
            }
            return Some((name.to_string(), first_number(parts[1])));
        }
    }

    Some((album.to_string(), None))
}

fn first_number(text: &str) -> Option<i32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn book_title(group: &AlbumGroup, first: &Track, file: &Path) -> String {
    let album = first.album.trim();
    let name = first.name.trim();

    if group.is_multi_track() && !album.is_empty() {
        album.to_string()
    } else if !name.is_empty() {
        name.to_string()
    } else if !album.is_empty() {
        album.to_string()
    } else {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lowercase extension without the dot
pub fn file_format(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Deepest directory containing every path
pub fn common_parent(paths: &[PathBuf]) -> PathBuf {
    let mut common = match paths.first().and_then(|p| p.parent()) {
        Some(parent) => parent.to_path_buf(),
        None => return PathBuf::new(),
    };

    for path in &paths[1..] {
        while !path.starts_with(&common) {
            if !common.pop() {
                return PathBuf::new();
            }
        }
    }

    common
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::encode_location;
    use tempfile::TempDir;

    fn audiobook(id: i64, path: &Path, album: &str, number: u32) -> Track {
        Track {
            track_id: id,
            persistent_id: format!("PID{}", id),
            name: format!("Part {}", number),
            artist: "Jane Author".to_string(),
            album: album.to_string(),
            genre: "Audiobook".to_string(),
            track_number: number,
            total_time_ms: 60_000,
            size: 1000,
            location: encode_location(path),
            parse_order: id as usize,
            ..Track::default()
        }
    }

    #[test]
    fn test_parse_series_patterns() {
        assert_eq!(
            parse_series("Middle-earth, Book 1"),
            Some(("Middle-earth".to_string(), Some(1)))
        );
        assert_eq!(
            parse_series("Discworld - Book 12"),
            Some(("Discworld".to_string(), Some(12)))
        );
        assert_eq!(
            parse_series("Expanse: Leviathan Wakes"),
            Some(("Expanse".to_string(), None))
        );
        assert_eq!(
            parse_series("Dune Chronicles"),
            Some(("Dune Chronicles".to_string(), None))
        );
        assert_eq!(parse_series("  "), None);
    }

    #[test]
    fn test_common_parent() {
        let paths = vec![
            PathBuf::from("/books/saga/cd1/01.mp3"),
            PathBuf::from("/books/saga/cd2/01.mp3"),
        ];
        assert_eq!(common_parent(&paths), PathBuf::from("/books/saga"));

        let same_dir = vec![
            PathBuf::from("/books/saga/01.mp3"),
            PathBuf::from("/books/saga/02.mp3"),
        ];
        assert_eq!(common_parent(&same_dir), PathBuf::from("/books/saga"));
    }

    #[test]
    fn test_candidate_for_multi_track_group() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("saga");
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("01.mp3");
        let b = dir.join("02.mp3");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let group = AlbumGroup {
            key: "Jane Author|Saga, Book 2".to_string(),
            tracks: vec![
                audiobook(1, &a, "Saga, Book 2", 1),
                audiobook(2, &b, "Saga, Book 2", 2),
            ],
        };
        let params = JobParams::new("/lib/Library.xml");

        let candidate = build_candidate(&group, &params).unwrap();
        assert_eq!(candidate.book.title, "Saga, Book 2");
        assert_eq!(candidate.book.file_path, dir.to_string_lossy());
        assert_eq!(candidate.book.duration_seconds, Some(120));
        assert_eq!(candidate.book.total_size, Some(2000));
        assert_eq!(candidate.book.format, "mp3");
        assert_eq!(candidate.book.persistent_id.as_deref(), Some("PID1"));
        assert_eq!(candidate.segments.len(), 2);
        assert_eq!(candidate.segments[1].track_number, Some(2));
        assert_eq!(candidate.series, Some(("Saga".to_string(), Some(2))));
        assert_eq!(candidate.author_name.as_deref(), Some("Jane Author"));
    }

    #[test]
    fn test_candidate_missing_file() {
        let group = AlbumGroup {
            key: "k".to_string(),
            tracks: vec![audiobook(1, Path::new("/definitely/not/here.m4b"), "", 1)],
        };
        let err = build_candidate(&group, &JobParams::new("/lib/Library.xml")).unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
    }

    #[test]
    fn test_single_track_uses_name_and_narrator() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("novel.m4b");
        std::fs::write(&file, b"x").unwrap();

        let mut track = audiobook(1, &file, "", 0);
        track.name = "The Novel".to_string();
        track.album_artist = "Sam Reader".to_string();
        track.comments = "Unabridged".to_string();
        let group = AlbumGroup {
            key: "k".to_string(),
            tracks: vec![track],
        };

        let mut params = JobParams::new("/lib/Library.xml");
        params.import_mode = ImportMode::Organized;
        let candidate = build_candidate(&group, &params).unwrap();
        assert_eq!(candidate.book.title, "The Novel");
        assert_eq!(candidate.book.file_path, file.to_string_lossy());
        assert_eq!(candidate.book.narrator.as_deref(), Some("Sam Reader"));
        assert_eq!(candidate.book.edition.as_deref(), Some("Unabridged"));
        assert_eq!(candidate.book.library_state, LibraryState::Organized);
        assert!(candidate.segments.is_empty());
        assert_eq!(candidate.series, None);
    }
}
