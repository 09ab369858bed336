//! Minimal XML property list reader
//!
//! Builds a [`PlistValue`] tree from the document. String values remember the
//! byte range of their raw (still XML-escaped) content in the source text so
//! write-back can splice replacements without re-serializing the document.

use super::ParseError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlistValue {
    String {
        value: String,
        /// Raw content range; `None` for `<string/>`
        span: Option<Range<usize>>,
    },
    /// Raw integer text, converted leniently by the caller
    Integer(String),
    Real(String),
    Bool(bool),
    Date(String),
    Data(String),
    Array(Vec<PlistValue>),
    Dict(Vec<(String, PlistValue)>),
}

impl PlistValue {
    pub(crate) fn get<'a>(&'a self, key: &str) -> Option<&'a PlistValue> {
        match self {
            PlistValue::Dict(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            PlistValue::String { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Integer value; unparsable or out-of-range text yields `None`
    pub(crate) fn as_i64(&self) -> Option<i64> {
        match self {
            PlistValue::Integer(raw) => raw.trim().parse::<i64>().ok(),
            PlistValue::Real(raw) => raw.trim().parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        }
    }

    pub(crate) fn as_bool(&self) -> Option<bool> {
        match self {
            PlistValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn as_date(&self) -> Option<&str> {
        match self {
            PlistValue::Date(raw) => Some(raw),
            _ => None,
        }
    }

    pub(crate) fn as_array(&self) -> Option<&[PlistValue]> {
        match self {
            PlistValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn as_dict(&self) -> Option<&[(String, PlistValue)]> {
        match self {
            PlistValue::Dict(entries) => Some(entries),
            _ => None,
        }
    }
}

enum Frame {
    Dict {
        entries: Vec<(String, PlistValue)>,
        pending_key: Option<String>,
    },
    Array(Vec<PlistValue>),
}

/// Parse a property list document and return its root value
pub(crate) fn parse_document(xml: &str) -> Result<PlistValue, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<PlistValue> = None;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(&reader, e))?;
        match event {
            Event::Start(start) => {
                let name = start.name();
                match name.as_ref() {
                    b"plist" => {}
                    b"dict" => stack.push(Frame::Dict {
                        entries: Vec::new(),
                        pending_key: None,
                    }),
                    b"array" => stack.push(Frame::Array(Vec::new())),
                    b"key" => {
                        let key = read_leaf_text(&mut reader, xml)?.0;
                        match stack.last_mut() {
                            Some(Frame::Dict { pending_key, .. }) if pending_key.is_none() => {
                                *pending_key = Some(key);
                            }
                            _ => {
                                return Err(malformed(&reader, "<key> outside a dict or without a value"))
                            }
                        }
                    }
                    b"string" => {
                        let (value, span) = read_leaf_text(&mut reader, xml)?;
                        push_value(&mut stack, &mut root, PlistValue::String { value, span: Some(span) }, &reader)?;
                    }
                    b"integer" => {
                        let value = PlistValue::Integer(read_leaf_text(&mut reader, xml)?.0);
                        push_value(&mut stack, &mut root, value, &reader)?;
                    }
                    b"real" => {
                        let value = PlistValue::Real(read_leaf_text(&mut reader, xml)?.0);
                        push_value(&mut stack, &mut root, value, &reader)?;
                    }
                    b"date" => {
                        let value = PlistValue::Date(read_leaf_text(&mut reader, xml)?.0);
                        push_value(&mut stack, &mut root, value, &reader)?;
                    }
                    b"data" => {
                        let value = PlistValue::Data(read_leaf_text(&mut reader, xml)?.0);
                        push_value(&mut stack, &mut root, value, &reader)?;
                    }
                    b"true" | b"false" => {
                        let value = PlistValue::Bool(name.as_ref() == b"true");
                        read_leaf_text(&mut reader, xml)?;
                        push_value(&mut stack, &mut root, value, &reader)?;
                    }
                    other => {
                        let element = String::from_utf8_lossy(other).into_owned();
                        return Err(malformed(&reader, &format!("unexpected element <{}>", element)));
                    }
                }
            }
            Event::Empty(empty) => {
                let value = match empty.name().as_ref() {
                    b"true" => PlistValue::Bool(true),
                    b"false" => PlistValue::Bool(false),
                    b"string" => PlistValue::String {
                        value: String::new(),
                        span: None,
                    },
                    b"dict" => PlistValue::Dict(Vec::new()),
                    b"array" => PlistValue::Array(Vec::new()),
                    b"integer" => PlistValue::Integer(String::new()),
                    b"key" => {
                        match stack.last_mut() {
                            Some(Frame::Dict { pending_key, .. }) if pending_key.is_none() => {
                                *pending_key = Some(String::new());
                            }
                            _ => return Err(malformed(&reader, "<key/> outside a dict")),
                        }
                        continue;
                    }
                    b"plist" => continue,
                    other => {
                        let element = String::from_utf8_lossy(other).into_owned();
                        return Err(malformed(&reader, &format!("unexpected element <{}/>", element)));
                    }
                };
                push_value(&mut stack, &mut root, value, &reader)?;
            }
            Event::End(end) => match end.name().as_ref() {
                b"dict" => match stack.pop() {
                    Some(Frame::Dict { entries, pending_key }) => {
                        if let Some(key) = pending_key {
                            return Err(malformed(&reader, &format!("key '{}' has no value", key)));
                        }
                        push_value(&mut stack, &mut root, PlistValue::Dict(entries), &reader)?;
                    }
                    _ => return Err(malformed(&reader, "unbalanced </dict>")),
                },
                b"array" => match stack.pop() {
                    Some(Frame::Array(items)) => {
                        push_value(&mut stack, &mut root, PlistValue::Array(items), &reader)?;
                    }
                    _ => return Err(malformed(&reader, "unbalanced </array>")),
                },
                _ => {}
            },
            Event::Text(text) => {
                let unescaped = text.unescape().map_err(|e| xml_error(&reader, e))?;
                if !unescaped.trim().is_empty() {
                    return Err(malformed(&reader, "unexpected text between elements"));
                }
            }
            Event::Eof => break,
            // Declarations, doctype, comments and processing instructions
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::Malformed("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| ParseError::Malformed("document has no root value".to_string()))
}

/// Read the text content of a leaf element up to its end tag
///
/// Returns the unescaped text and the byte range of the raw content.
fn read_leaf_text(reader: &mut Reader<&[u8]>, xml: &str) -> Result<(String, Range<usize>), ParseError> {
    let start = content_start(xml, reader.buffer_position());
    let mut value = String::new();

    loop {
        match reader.read_event().map_err(|e| xml_error(reader, e))? {
            Event::Text(text) => {
                value.push_str(&text.unescape().map_err(|e| xml_error(reader, e))?);
            }
            Event::CData(cdata) => {
                value.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
            }
            Event::End(end) => {
                let tag = format!("</{}", String::from_utf8_lossy(end.name().as_ref()));
                let end_pos = xml[start..]
                    .find(&tag)
                    .map(|offset| start + offset)
                    .unwrap_or(start);
                return Ok((value, start..end_pos));
            }
            Event::Comment(_) => {}
            Event::Eof => {
                return Err(ParseError::Malformed("unterminated element".to_string()));
            }
            _ => return Err(malformed(reader, "nested element inside a value")),
        }
    }
}

/// Byte offset just after the `>` of the start tag that was last read
fn content_start(xml: &str, position: usize) -> usize {
    let bytes = xml.as_bytes();
    if position > 0 && position <= bytes.len() && bytes[position - 1] == b'>' {
        return position;
    }
    // Position did not land on the tag end; scan back to it
    xml[..position.min(bytes.len())]
        .rfind('>')
        .map(|i| i + 1)
        .unwrap_or(position)
}

fn push_value(
    stack: &mut [Frame],
    root: &mut Option<PlistValue>,
    value: PlistValue,
    reader: &Reader<&[u8]>,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(Frame::Dict { entries, pending_key }) => match pending_key.take() {
            Some(key) => {
                entries.push((key, value));
                Ok(())
            }
            None => Err(malformed(reader, "dict value without a preceding <key>")),
        },
        Some(Frame::Array(items)) => {
            items.push(value);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(malformed(reader, "more than one root value"));
            }
            *root = Some(value);
            Ok(())
        }
    }
}

fn xml_error(reader: &Reader<&[u8]>, error: quick_xml::Error) -> ParseError {
    ParseError::Xml {
        position: reader.buffer_position(),
        message: error.to_string(),
    }
}

fn malformed(reader: &Reader<&[u8]>, message: &str) -> ParseError {
    ParseError::Malformed(format!("{} (near byte {})", message, reader.buffer_position()))
}
