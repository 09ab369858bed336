//! Location codec
//!
//! Export locations are percent-encoded `file://` URLs. Path remapping works
//! on the raw (still encoded) form so mappings can be copied verbatim from the
//! export, e.g. `file://localhost/W:/itunes/iTunes%20Media`.

use shelf_common::config::PathMapping;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCALHOST_PREFIX: &str = "file://localhost";
const FILE_PREFIX: &str = "file://";

/// A track location that cannot be turned into a file path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("location is empty")]
    Empty,

    #[error("location is not a local file: {0}")]
    NotAFile(String),

    #[error("failed to URL decode location {location}: {reason}")]
    InvalidEncoding { location: String, reason: String },
}

/// Decode a raw `file://` location into a local path
pub fn decode_location(raw: &str) -> Result<PathBuf, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Err(DecodeError::NotAFile(raw.to_string()));
    }

    let stripped = raw
        .strip_prefix(LOCALHOST_PREFIX)
        .or_else(|| raw.strip_prefix(FILE_PREFIX))
        .unwrap_or(raw);

    let decoded = urlencoding::decode(stripped).map_err(|e| DecodeError::InvalidEncoding {
        location: raw.to_string(),
        reason: e.to_string(),
    })?;

    // "/C:/Users/..." → "C:/Users/..."
    if cfg!(windows) {
        if let Some(rest) = decoded.strip_prefix('/') {
            return Ok(PathBuf::from(rest));
        }
    }

    Ok(PathBuf::from(decoded.into_owned()))
}

/// Encode a local path as a raw `file://localhost` location
pub fn encode_location(path: &Path) -> String {
    let mut text = path.to_string_lossy().replace('\\', "/");
    if !text.starts_with('/') {
        text.insert(0, '/');
    }

    let encoded: Vec<String> = text
        .split('/')
        .map(|segment| urlencoding::encode(segment).replace("%3A", ":"))
        .collect();

    format!("{}{}", LOCALHOST_PREFIX, encoded.join("/"))
}

/// Apply the longest matching prefix mapping to a raw location
///
/// Idempotent: a location that already carries a mapping's target prefix at
/// least as specific as the best source match is returned unchanged.
pub fn remap(raw: &str, mappings: &[PathMapping]) -> String {
    remap_with(raw, mappings.iter().map(|m| (m.from.as_str(), m.to.as_str())))
}

/// Map a catalog-side location back into the export's prefix space
pub fn reverse_remap(raw: &str, mappings: &[PathMapping]) -> String {
    remap_with(raw, mappings.iter().map(|m| (m.to.as_str(), m.from.as_str())))
}

fn remap_with<'a>(raw: &str, mappings: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let normalized = raw.replace('\\', "/");
    let pairs: Vec<(String, &str)> = mappings
        .filter(|(from, to)| !from.is_empty() && !to.is_empty())
        .map(|(from, to)| (from.replace('\\', "/"), to))
        .collect();

    let best = pairs
        .iter()
        .filter(|(from, _)| normalized.starts_with(from.as_str()))
        .max_by_key(|(from, _)| from.len());

    let Some((from, to)) = best else {
        return raw.to_string();
    };

    let already_mapped = pairs.iter().any(|(_, target)| {
        let target = target.replace('\\', "/");
        target.len() >= from.len() && normalized.starts_with(&target)
    });
    if already_mapped {
        return raw.to_string();
    }

    format!("{}{}", to, &normalized[from.len()..])
}

/// Distinct `file://` prefixes (root plus two directories) for mapping suggestions
pub fn extract_path_prefixes<'a>(locations: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut prefixes: Vec<String> = Vec::new();

    for location in locations {
        if !location.starts_with(FILE_PREFIX) {
            continue;
        }
        let after = location
            .strip_prefix("file://localhost/")
            .unwrap_or_else(|| location.trim_start_matches(FILE_PREFIX).trim_start_matches('/'));
        let parts: Vec<&str> = after.splitn(4, '/').collect();
        let head = if parts.len() >= 3 { &parts[..3] } else { &parts[..] };
        let prefix = format!("file://localhost/{}", head.join("/"));

        if !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }

    prefixes
}
