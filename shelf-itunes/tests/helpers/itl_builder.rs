//! Minimal binary libraries for write-back tests

use shelf_itunes::itl::encode_itl;
use std::path::{Path, PathBuf};

const HOHM_LOCAL_URL: u32 = 0x0B;
const HOHM_LOCATION: u32 = 0x0D;
const UTF8: u8 = 2;

fn chunk_header(tag: &[u8; 4], len: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(tag);
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    buf
}

fn hohm(kind: u32, value: &str) -> Vec<u8> {
    let len = 40 + value.len();
    let mut buf = chunk_header(b"hohm", len);
    buf.extend_from_slice(&kind.to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, UTF8]);
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(&[0; 8]);
    buf.extend_from_slice(value.as_bytes());
    buf
}

/// Track record plus its native path and URL strings
pub fn itl_track(track_id: u32, persistent_id: &str, path: &Path, url: &str) -> Vec<u8> {
    let mut htim = chunk_header(b"htim", 156);
    htim.resize(156, 0);
    htim[16..20].copy_from_slice(&track_id.to_be_bytes());
    htim[128..136].copy_from_slice(&hex::decode(persistent_id).unwrap());

    let mut buf = htim;
    buf.extend(hohm(HOHM_LOCATION, &path.to_string_lossy()));
    buf.extend(hohm(HOHM_LOCAL_URL, url));
    buf
}

/// Compressed library holding `tracks` in one section
pub fn write_itl(path: &Path, tracks: &[Vec<u8>]) -> PathBuf {
    let content: Vec<u8> = tracks.concat();
    let mut section = chunk_header(b"hdsm", 12 + content.len());
    section.extend(content);

    std::fs::write(path, encode_itl("12.0", &section, true).unwrap()).unwrap();
    path.to_path_buf()
}
