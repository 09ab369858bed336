//! Binary library (`.itl`) support
//!
//! The media player keeps its own binary library next to the XML export and
//! rebuilds the export from it. Writing locations back into the export alone
//! is lost the next time the player saves, so automatic write-back can also
//! patch the binary library.
//!
//! File layout: an `hdfm` header in the clear (tag, header length, file
//! length, an opaque word, a length-prefixed version string and opaque
//! trailing bytes), then the payload, see [`crypt`](self::crypt) and
//! [`chunks`](self::chunks).
//!
//! Only track chunks and their location strings are interpreted; every other
//! byte is carried over unchanged.

mod chunks;
mod crypt;

use chunks::LocationValues;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HDFM_MAGIC: &[u8; 4] = b"hdfm";
/// Fixed part of the header before the version string
const HDFM_FIXED_LEN: usize = 17;

/// Binary library failure
#[derive(Debug, Error)]
pub enum ItlError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a binary library: {0}")]
    NotItl(String),

    #[error("binary library payload is unreadable: {0}")]
    Payload(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ItlError + '_ {
    move |source| ItlError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Clear-text `hdfm` header
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    header_len: usize,
    unknown: u32,
    version: String,
    remainder: Vec<u8>,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Self, ItlError> {
        if data.len() < HDFM_FIXED_LEN || &data[..4] != HDFM_MAGIC {
            return Err(ItlError::NotItl("missing hdfm header".to_string()));
        }

        let header_len = chunks::read_u32(data, 4).unwrap_or(0) as usize;
        if header_len < HDFM_FIXED_LEN || header_len > data.len() {
            return Err(ItlError::NotItl(format!(
                "header length {} does not fit file of {} bytes",
                header_len,
                data.len()
            )));
        }

        let version_len = data[16] as usize;
        let version_end = HDFM_FIXED_LEN + version_len;
        if version_end > header_len {
            return Err(ItlError::NotItl("version string exceeds header".to_string()));
        }

        Ok(Self {
            header_len,
            unknown: chunks::read_u32(data, 12).unwrap_or(0),
            version: String::from_utf8_lossy(&data[HDFM_FIXED_LEN..version_end]).into_owned(),
            remainder: data[version_end..header_len].to_vec(),
        })
    }

    /// Header bytes for a file whose payload is `payload_len` bytes
    fn encode(&self, payload_len: usize) -> Vec<u8> {
        let version = self.version.as_bytes();
        let header_len = HDFM_FIXED_LEN + version.len() + self.remainder.len();

        let mut buf = Vec::with_capacity(header_len);
        buf.extend_from_slice(HDFM_MAGIC);
        buf.extend_from_slice(&(header_len as u32).to_be_bytes());
        buf.extend_from_slice(&((header_len + payload_len) as u32).to_be_bytes());
        buf.extend_from_slice(&self.unknown.to_be_bytes());
        buf.push(version.len() as u8);
        buf.extend_from_slice(version);
        buf.extend_from_slice(&self.remainder);
        buf
    }
}

/// One track of the binary library
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItlTrack {
    pub track_id: u32,
    /// Uppercase hex, as in the XML export
    pub persistent_id: String,
    pub name: String,
    pub album: String,
    pub artist: String,
    pub kind: String,
    /// Native file path
    pub location: String,
    /// `file://` URL
    pub local_url: String,
    pub size: u32,
    pub total_time_ms: u32,
    pub track_number: u32,
}

/// Parsed binary library
#[derive(Debug, Clone, Default)]
pub struct ItlLibrary {
    pub version: String,
    /// Payload was zlib-compressed
    pub compressed: bool,
    pub tracks: Vec<ItlTrack>,
}

impl ItlLibrary {
    pub fn track_by_persistent_id(&self, persistent_id: &str) -> Option<&ItlTrack> {
        self.tracks
            .iter()
            .find(|t| t.persistent_id.eq_ignore_ascii_case(persistent_id))
    }
}

/// New location for one track, as a `file://` URL in the player's prefix space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItlLocationUpdate {
    pub persistent_id: String,
    pub location_url: String,
}

/// Decrypt and inflate; returns the header, the payload and whether it was compressed
fn open(data: &[u8]) -> Result<(Header, Vec<u8>, bool), ItlError> {
    let header = Header::parse(data)?;
    let decrypted = crypt::decrypt(&header.version, &data[header.header_len..]);
    let (payload, compressed) = crypt::inflate(decrypted);
    Ok((header, payload, compressed))
}

/// Serialize a payload into a complete file
fn seal(header: &Header, payload: &[u8], compress: bool) -> Result<Vec<u8>, ItlError> {
    let body = if compress {
        crypt::deflate(payload).map_err(|e| ItlError::Payload(format!("deflate failed: {}", e)))?
    } else {
        payload.to_vec()
    };
    let encrypted = crypt::encrypt(&header.version, &body);

    let mut out = header.encode(encrypted.len());
    out.extend_from_slice(&encrypted);
    Ok(out)
}

/// Build a binary library file around a clear payload
pub fn encode_itl(version: &str, payload: &[u8], compress: bool) -> Result<Vec<u8>, ItlError> {
    let header = Header {
        header_len: 0,
        unknown: 0,
        version: version.to_string(),
        remainder: Vec::new(),
    };
    seal(&header, payload, compress)
}

pub fn parse_itl_bytes(data: &[u8]) -> Result<ItlLibrary, ItlError> {
    let (header, payload, compressed) = open(data)?;
    Ok(ItlLibrary {
        version: header.version,
        compressed,
        tracks: chunks::read_tracks(&payload),
    })
}

pub fn parse_itl(path: &Path) -> Result<ItlLibrary, ItlError> {
    let data = std::fs::read(path).map_err(io_error(path))?;
    parse_itl_bytes(&data)
}

/// Header parses and the payload starts with a known chunk
pub fn validate_itl_bytes(data: &[u8]) -> Result<(), ItlError> {
    let (_, payload, _) = open(data)?;
    match payload.get(..4) {
        Some(b"hdsm" | b"msdh" | b"htim" | b"hohm") => Ok(()),
        Some(tag) => Err(ItlError::Payload(format!(
            "unexpected first chunk {:?}",
            String::from_utf8_lossy(tag)
        ))),
        None => Err(ItlError::Payload("payload is empty".to_string())),
    }
}

pub fn validate_itl(path: &Path) -> Result<(), ItlError> {
    let data = std::fs::read(path).map_err(io_error(path))?;
    validate_itl_bytes(&data)
}

/// Rewrite track locations in a binary library image
///
/// Returns the new image and the number of location strings changed.
pub fn update_itl_bytes(data: &[u8], updates: &[ItlLocationUpdate]) -> Result<(Vec<u8>, usize), ItlError> {
    let (header, payload, compressed) = open(data)?;

    let values: HashMap<String, LocationValues> = updates
        .iter()
        .filter(|u| !u.persistent_id.is_empty())
        .map(|u| {
            let path = crate::location::decode_location(&u.location_url)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| u.location_url.clone());
            (
                u.persistent_id.to_ascii_uppercase(),
                LocationValues {
                    path,
                    url: u.location_url.clone(),
                },
            )
        })
        .collect();

    let (rewritten, count) = chunks::rewrite_locations(&payload, &values);
    if count == 0 {
        return Ok((data.to_vec(), 0));
    }
    Ok((seal(&header, &rewritten, compressed)?, count))
}

/// Rewrite track locations in the binary library at `path`
///
/// The new image is validated before it replaces the file through a sibling
/// temp file and a rename. Nothing is written when no location changes.
pub fn write_itl_locations(path: &Path, updates: &[ItlLocationUpdate]) -> Result<usize, ItlError> {
    let data = std::fs::read(path).map_err(io_error(path))?;
    let (image, count) = update_itl_bytes(&data, updates)?;
    if count == 0 {
        return Ok(0);
    }
    validate_itl_bytes(&image)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, &image).map_err(io_error(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_error(path))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::chunks::tests::{hdsm, hohm, htim};
    use super::chunks::{HOHM_ALBUM, HOHM_LOCAL_URL, HOHM_LOCATION, HOHM_NAME};
    use super::*;
    use tempfile::TempDir;

    fn sample_payload() -> Vec<u8> {
        let mut content = Vec::new();
        content.extend(htim(7, [0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x11, 0x22, 0x33]));
        content.extend(hohm(HOHM_NAME, "Chapter 1"));
        content.extend(hohm(HOHM_ALBUM, "Saga"));
        content.extend(hohm(HOHM_LOCATION, "/Volumes/Books/Saga/01.m4b"));
        content.extend(hohm(HOHM_LOCAL_URL, "file://localhost/Volumes/Books/Saga/01.m4b"));
        // Padding so the partial-encryption limit is crossed
        content.extend(std::iter::repeat(0u8).take(120_000));
        hdsm(&content)
    }

    #[test]
    fn test_header_rejects_other_files() {
        assert!(matches!(Header::parse(b"<?xml version"), Err(ItlError::NotItl(_))));

        let mut data = encode_itl("12.0", b"hdsm\0\0\0\x0c\0\0\0\x0c", false).unwrap();
        data[7] = 0xFF;
        assert!(matches!(Header::parse(&data), Err(ItlError::NotItl(_))));
    }

    #[test]
    fn test_header_round_trip_keeps_opaque_bytes() {
        let header = Header {
            header_len: 0,
            unknown: 0xDEAD_BEEF,
            version: "12.9.5.5".to_string(),
            remainder: vec![1, 2, 3, 4],
        };
        let bytes = header.encode(100);
        let parsed = Header::parse(&[bytes.clone(), vec![0; 100]].concat()).unwrap();

        assert_eq!(parsed.header_len, bytes.len());
        assert_eq!(parsed.unknown, 0xDEAD_BEEF);
        assert_eq!(parsed.version, "12.9.5.5");
        assert_eq!(parsed.remainder, vec![1, 2, 3, 4]);
        assert_eq!(chunks::read_u32(&bytes, 8), Some((bytes.len() + 100) as u32));
    }

    #[test]
    fn test_parse_compressed_and_plain() {
        for compress in [true, false] {
            let data = encode_itl("12.0", &sample_payload(), compress).unwrap();
            validate_itl_bytes(&data).unwrap();

            let library = parse_itl_bytes(&data).unwrap();
            assert_eq!(library.compressed, compress);
            assert_eq!(library.version, "12.0");

            let track = library.track_by_persistent_id("aabbccdd00112233").unwrap();
            assert_eq!(track.track_id, 7);
            assert_eq!(track.name, "Chapter 1");
            assert_eq!(track.album, "Saga");
            assert_eq!(track.location, "/Volumes/Books/Saga/01.m4b");
        }
    }

    #[test]
    fn test_validate_rejects_garbage_payload() {
        let data = encode_itl("12.0", b"zzzzzzzzzzzzzzzz", false).unwrap();
        assert!(matches!(validate_itl_bytes(&data), Err(ItlError::Payload(_))));
    }

    #[test]
    fn test_write_locations_in_place() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("iTunes Library.itl");
        std::fs::write(&path, encode_itl("12.0", &sample_payload(), true).unwrap()).unwrap();

        let updates = vec![ItlLocationUpdate {
            persistent_id: "aabbccdd00112233".to_string(),
            location_url: "file://localhost/Volumes/Managed/Jane%20Doe/Saga/01.m4b".to_string(),
        }];
        assert_eq!(write_itl_locations(&path, &updates).unwrap(), 2);

        let library = parse_itl(&path).unwrap();
        assert!(library.compressed);
        let track = &library.tracks[0];
        assert_eq!(track.location, "/Volumes/Managed/Jane Doe/Saga/01.m4b");
        assert_eq!(track.local_url, "file://localhost/Volumes/Managed/Jane%20Doe/Saga/01.m4b");
        assert_eq!(track.name, "Chapter 1");
        assert!(!temp.path().join("iTunes Library.itl.tmp").exists());
    }

    #[test]
    fn test_write_without_matches_leaves_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("iTunes Library.itl");
        let original = encode_itl("12.0", &sample_payload(), true).unwrap();
        std::fs::write(&path, &original).unwrap();

        let updates = vec![ItlLocationUpdate {
            persistent_id: "0000000000000000".to_string(),
            location_url: "file://localhost/x.m4b".to_string(),
        }];
        assert_eq!(write_itl_locations(&path, &updates).unwrap(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }
}
