//! Chunk walking over a decrypted, inflated payload
//!
//! Every chunk starts with a 4-byte tag and a big-endian 4-byte length.
//! `hdsm` sections nest further chunks after a 12-byte header; their real
//! extent is the larger of the two length fields. A track (`htim`) owns the
//! `hohm` string chunks that follow it until the next track or playlist.
//!
//! Layouts used here:
//! - `htim`: +16 track id, +36 size, +40 duration ms, +44 track number,
//!   +128 8-byte persistent id
//! - `hohm`: +12 string type, +27 encoding flag, +28 string byte length,
//!   +40 string bytes

use super::ItlTrack;
use encoding_rs::WINDOWS_1252;
use std::collections::HashMap;

const CHUNK_HEADER: usize = 8;
const HDSM_HEADER: usize = 12;
const HOHM_HEADER: usize = 40;
const HTIM_PID_OFFSET: usize = 128;

/// `hohm` string types
pub(super) const HOHM_NAME: u32 = 0x02;
pub(super) const HOHM_ALBUM: u32 = 0x03;
pub(super) const HOHM_ARTIST: u32 = 0x04;
pub(super) const HOHM_KIND: u32 = 0x06;
/// `file://` URL, used for audiobooks and podcasts
pub(super) const HOHM_LOCAL_URL: u32 = 0x0B;
/// Native file path
pub(super) const HOHM_LOCATION: u32 = 0x0D;

/// `hohm` string encodings
const ENCODING_ASCII: u8 = 0;
const ENCODING_UTF16BE: u8 = 1;
const ENCODING_UTF8: u8 = 2;
const ENCODING_WINDOWS_1252: u8 = 3;

pub(super) fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    if let Some(slot) = buf.get_mut(offset..offset + 4) {
        slot.copy_from_slice(&value.to_be_bytes());
    }
}

/// Tag and length of the chunk at `offset` if it fits before `end`
fn chunk_at(data: &[u8], offset: usize, end: usize) -> Option<(&[u8], usize)> {
    if offset + CHUNK_HEADER > end {
        return None;
    }
    let tag = &data[offset..offset + 4];
    let len = read_u32(data, offset + 4)? as usize;
    if len < CHUNK_HEADER || offset + len > end {
        return None;
    }
    Some((tag, len))
}

/// Extent of an `hdsm` section
fn hdsm_span(data: &[u8], offset: usize, len: usize, end: usize) -> usize {
    match read_u32(data, offset + 8) {
        Some(ext) if ext as usize > len && offset + ext as usize <= end => ext as usize,
        _ => len,
    }
}

fn htim_persistent_id(data: &[u8], offset: usize, len: usize) -> Option<String> {
    if len < HTIM_PID_OFFSET + 8 {
        return None;
    }
    let pid = data.get(offset + HTIM_PID_OFFSET..offset + HTIM_PID_OFFSET + 8)?;
    Some(hex::encode_upper(pid))
}

pub(super) fn decode_string(bytes: &[u8], encoding: u8) -> Option<String> {
    match encoding {
        ENCODING_ASCII | ENCODING_UTF8 => Some(String::from_utf8_lossy(bytes).into_owned()),
        ENCODING_UTF16BE => {
            let units: Vec<u16> = bytes
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        }
        ENCODING_WINDOWS_1252 => Some(WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()),
        _ => None,
    }
}

/// Windows-1252 when every character maps, UTF-16BE otherwise
pub(super) fn encode_string(value: &str) -> (Vec<u8>, u8) {
    if value.chars().all(|c| (c as u32) <= 0xFF) {
        let (bytes, _, had_errors) = WINDOWS_1252.encode(value);
        if !had_errors {
            return (bytes.into_owned(), ENCODING_WINDOWS_1252);
        }
    }
    let bytes = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
    (bytes, ENCODING_UTF16BE)
}

/// String type and value of an `hohm` chunk
fn read_hohm(data: &[u8], offset: usize, len: usize) -> Option<(u32, String)> {
    if len < HOHM_HEADER {
        return None;
    }
    let kind = read_u32(data, offset + 12)?;
    let encoding = data[offset + 27];
    let declared = read_u32(data, offset + 28)? as usize;
    let start = offset + HOHM_HEADER;
    let available = offset + len - start;
    let bytes = &data[start..start + declared.min(available)];
    decode_string(bytes, encoding).map(|value| (kind, value))
}

/// Rebuild an `hohm` chunk around a new string, keeping its type and header
fn build_hohm(data: &[u8], offset: usize, value: &str) -> Vec<u8> {
    let (encoded, encoding) = encode_string(value);
    let total = HOHM_HEADER + encoded.len();

    let mut buf = vec![0u8; total];
    buf[..4].copy_from_slice(&data[offset..offset + 4]);
    write_u32(&mut buf, 4, total as u32);
    write_u32(&mut buf, 8, total as u32);
    buf[12..28].copy_from_slice(&data[offset + 12..offset + 28]);
    buf[27] = encoding;
    write_u32(&mut buf, 28, encoded.len() as u32);
    buf[HOHM_HEADER..].copy_from_slice(&encoded);
    buf
}

/// Collect tracks with their string fields
pub(super) fn read_tracks(data: &[u8]) -> Vec<ItlTrack> {
    let mut tracks = Vec::new();
    let mut current = None;
    walk_tracks(data, 0, data.len(), &mut tracks, &mut current);
    tracks
}

fn walk_tracks(
    data: &[u8],
    start: usize,
    end: usize,
    tracks: &mut Vec<ItlTrack>,
    current: &mut Option<usize>,
) {
    let mut offset = start;
    while let Some((tag, len)) = chunk_at(data, offset, end) {
        match tag {
            b"hdsm" => {
                let span = hdsm_span(data, offset, len, end);
                if span > HDSM_HEADER {
                    walk_tracks(data, offset + HDSM_HEADER, offset + span, tracks, current);
                }
                offset += span;
                continue;
            }
            b"htim" => {
                let field = |at: usize| if len >= at + 4 { read_u32(data, offset + at) } else { None };
                tracks.push(ItlTrack {
                    track_id: field(16).unwrap_or(0),
                    persistent_id: htim_persistent_id(data, offset, len).unwrap_or_default(),
                    size: field(36).unwrap_or(0),
                    total_time_ms: field(40).unwrap_or(0),
                    track_number: field(44).unwrap_or(0),
                    ..ItlTrack::default()
                });
                *current = Some(tracks.len() - 1);
            }
            b"hpim" => *current = None,
            b"hohm" => {
                if let (Some(index), Some((kind, value))) = (*current, read_hohm(data, offset, len)) {
                    let track = &mut tracks[index];
                    match kind {
                        HOHM_NAME => track.name = value,
                        HOHM_ALBUM => track.album = value,
                        HOHM_ARTIST => track.artist = value,
                        HOHM_KIND => track.kind = value,
                        HOHM_LOCAL_URL => track.local_url = value,
                        HOHM_LOCATION => track.location = value,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        offset += len;
    }
}

/// New location strings for one persistent id
pub(super) struct LocationValues {
    /// Native path for `hohm` 0x0D
    pub path: String,
    /// `file://` URL for `hohm` 0x0B
    pub url: String,
}

/// Rewrite location strings of tracks whose persistent id is in `updates`
///
/// Keys are uppercase hex. Returns the new payload and the number of
/// rewritten strings.
pub(super) fn rewrite_locations(data: &[u8], updates: &HashMap<String, LocationValues>) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(data.len() + 1024);
    let mut current = None;
    let count = rewrite_range(data, 0, data.len(), updates, &mut current, &mut out);
    (out, count)
}

fn rewrite_range(
    data: &[u8],
    start: usize,
    end: usize,
    updates: &HashMap<String, LocationValues>,
    current: &mut Option<String>,
    out: &mut Vec<u8>,
) -> usize {
    let mut count = 0;
    let mut offset = start;

    while let Some((tag, len)) = chunk_at(data, offset, end) {
        match tag {
            b"hdsm" => {
                let span = hdsm_span(data, offset, len, end);
                if span < HDSM_HEADER {
                    out.extend_from_slice(&data[offset..offset + span]);
                } else {
                    let mut section = data[offset..offset + HDSM_HEADER].to_vec();
                    count += rewrite_range(data, offset + HDSM_HEADER, offset + span, updates, current, &mut section);
                    let section_len = section.len() as u32;
                    write_u32(&mut section, 4, section_len);
                    write_u32(&mut section, 8, section_len);
                    out.extend_from_slice(&section);
                }
                offset += span;
                continue;
            }
            b"htim" => {
                *current = htim_persistent_id(data, offset, len);
                out.extend_from_slice(&data[offset..offset + len]);
            }
            b"hpim" => {
                *current = None;
                out.extend_from_slice(&data[offset..offset + len]);
            }
            b"hohm" => {
                let replacement = current
                    .as_ref()
                    .and_then(|pid| updates.get(pid))
                    .and_then(|values| match read_u32(data, offset + 12) {
                        Some(HOHM_LOCATION) if len >= HOHM_HEADER => Some(values.path.as_str()),
                        Some(HOHM_LOCAL_URL) if len >= HOHM_HEADER => Some(values.url.as_str()),
                        _ => None,
                    });
                match replacement {
                    Some(value) => {
                        out.extend_from_slice(&build_hohm(data, offset, value));
                        count += 1;
                    }
                    None => out.extend_from_slice(&data[offset..offset + len]),
                }
            }
            _ => out.extend_from_slice(&data[offset..offset + len]),
        }
        offset += len;
    }

    // Bytes that do not form a chunk are kept verbatim
    out.extend_from_slice(&data[offset.min(end)..end]);
    count
}
