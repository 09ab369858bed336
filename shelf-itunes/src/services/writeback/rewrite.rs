//! In-place location rewriting
//!
//! Only the bytes inside matching `Location` strings change; everything else
//! in the export is copied through untouched.

use crate::export::{parse_str, LocationSpan};
use crate::{Error, Result};
use std::collections::HashMap;

/// Rewritten document plus the number of locations replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rewrite {
    pub text: String,
    pub updated_count: usize,
}

/// Replace the location of every track whose persistent id is in `locations`
///
/// `locations` maps persistent id → raw (unescaped) location.
pub(crate) fn rewrite_locations(xml: &str, locations: &HashMap<String, String>) -> Result<Rewrite> {
    let library = parse_str(xml)?;
    splice(xml, &library.location_spans, locations)
}

fn splice(xml: &str, spans: &[LocationSpan], locations: &HashMap<String, String>) -> Result<Rewrite> {
    let mut targets: Vec<(&LocationSpan, &String)> = spans
        .iter()
        .filter_map(|span| locations.get(&span.persistent_id).map(|loc| (span, loc)))
        .collect();
    targets.sort_by_key(|(span, _)| span.range.start);

    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for (span, location) in &targets {
        if span.range.start < cursor || span.range.end > xml.len() {
            return Err(Error::Internal(format!(
                "overlapping location span for persistent id {}",
                span.persistent_id
            )));
        }
        out.push_str(&xml[cursor..span.range.start]);
        out.push_str(&quick_xml::escape::escape(location.as_str()));
        cursor = span.range.end;
    }
    out.push_str(&xml[cursor..]);

    Ok(Rewrite {
        text: out,
        updated_count: targets.len(),
    })
}
