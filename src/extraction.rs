//! Turns raw model text into candidate places and display text.
//!
//! Fallback order: an embedded JSON payload, then a "City, Country" pattern
//! scan over the prose, then the prose alone.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::places::{CoordinateField, PartialPlace};

pub const PLACEHOLDER_TEXT: &str = "Here are some suggestions:";
pub const EMPTY_REPLY_TEXT: &str = "Sorry, I couldn't put together an answer. Please try again.";
pub const MAX_SCANNED_PLACES: usize = 8;

static PLACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\p{Lu}[\p{L}\p{M}'’-]*(?:[ \t]+\p{Lu}[\p{L}\p{M}'’-]*)*,[ \t]*\p{Lu}[\p{L}\p{M}'’-]*(?:[ \t]+\p{Lu}[\p{L}\p{M}'’-]*)*",
    )
    .expect("place pattern compiles")
});

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z]*").expect("fence pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    /// Places came from an embedded JSON payload.
    Structured,
    /// Places came from the "City, Country" scan.
    Heuristic,
    /// Nothing place-like was found.
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub display_text: String,
    pub places: Vec<PartialPlace>,
    pub source: ExtractionSource,
}

/// The shapes a JSON payload from the model can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Array(Vec<PartialPlace>),
    ObjectWithLocations {
        text: Option<String>,
        places: Vec<PartialPlace>,
    },
    SingleObject {
        place: PartialPlace,
        text: Option<String>,
    },
    Unparsed,
}

impl ParsedPayload {
    pub fn parse(span: &str) -> Self {
        let value = match serde_json::from_str::<Value>(span) {
            Ok(value) => value,
            Err(err) => {
                debug!(?err, "embedded JSON did not parse");
                return ParsedPayload::Unparsed;
            }
        };

        match value {
            Value::Array(items) => {
                ParsedPayload::Array(items.iter().filter_map(partial_place).collect())
            }
            Value::Object(map) => {
                let text = map
                    .get("text")
                    .and_then(Value::as_str)
                    .map(|text| text.to_string());
                if let Some(Value::Array(items)) = map.get("locations") {
                    return ParsedPayload::ObjectWithLocations {
                        text,
                        places: items.iter().filter_map(partial_place).collect(),
                    };
                }
                if let Some(place) = partial_from_map(&map) {
                    return ParsedPayload::SingleObject { place, text };
                }
                if text.is_some() {
                    return ParsedPayload::ObjectWithLocations {
                        text,
                        places: Vec::new(),
                    };
                }
                ParsedPayload::Unparsed
            }
            _ => ParsedPayload::Unparsed,
        }
    }

    fn into_parts(self) -> Option<(Option<String>, Vec<PartialPlace>)> {
        match self {
            ParsedPayload::Array(places) => Some((None, places)),
            ParsedPayload::ObjectWithLocations { text, places } => Some((text, places)),
            ParsedPayload::SingleObject { place, text } => Some((text, vec![place])),
            ParsedPayload::Unparsed => None,
        }
    }
}

pub fn extract(raw_text: &str) -> ExtractionResult {
    if let Some(span) = find_json_span(raw_text) {
        let payload = ParsedPayload::parse(&raw_text[span.clone()]);
        match payload.into_parts() {
            Some((text, places)) if !places.is_empty() => {
                let display_text = non_blank(text).unwrap_or_else(|| {
                    let remainder = remove_span(raw_text, span);
                    if remainder.is_empty() {
                        PLACEHOLDER_TEXT.to_string()
                    } else {
                        remainder
                    }
                });
                debug!(places = places.len(), "extracted places from JSON payload");
                return ExtractionResult {
                    display_text,
                    places,
                    source: ExtractionSource::Structured,
                };
            }
            // A recognised reply without places: its text is the prose.
            Some((text, _)) => {
                if let Some(text) = non_blank(text) {
                    return scan_prose(&text);
                }
            }
            None => {}
        }
    }
    scan_prose(raw_text)
}

fn scan_prose(prose: &str) -> ExtractionResult {
    let places = scan_place_names(prose)
        .into_iter()
        .map(PartialPlace::named)
        .collect::<Vec<_>>();
    let source = if places.is_empty() {
        ExtractionSource::Plain
    } else {
        debug!(places = places.len(), "extracted places from prose pattern");
        ExtractionSource::Heuristic
    };
    ExtractionResult {
        display_text: prose.to_string(),
        places,
        source,
    }
}

/// Up to eight distinct "City, Country" shaped matches, in order of appearance.
pub fn scan_place_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for found in PLACE_PATTERN.find_iter(text) {
        let candidate = found.as_str();
        if names.iter().any(|existing| existing == candidate) {
            continue;
        }
        names.push(candidate.to_string());
        if names.len() == MAX_SCANNED_PLACES {
            break;
        }
    }
    names
}

/// Byte range from the first `{` or `[` to the last matching closer.
fn find_json_span(text: &str) -> Option<Range<usize>> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| start..end + closer.len_utf8())
}

fn remove_span(text: &str, span: Range<usize>) -> String {
    let joined = format!("{}{}", &text[..span.start], &text[span.end..]);
    CODE_FENCE.replace_all(&joined, "").trim().to_string()
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn partial_place(value: &Value) -> Option<PartialPlace> {
    value.as_object().and_then(partial_from_map)
}

fn partial_from_map(map: &Map<String, Value>) -> Option<PartialPlace> {
    let name = map.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let nested = map.get("coordinates").and_then(Value::as_object);
    Some(PartialPlace {
        name: name.to_string(),
        lat: coordinate_field(map, nested, &["lat", "latitude"]),
        lng: coordinate_field(map, nested, &["lng", "lon", "longitude"]),
        description: map
            .get("description")
            .and_then(Value::as_str)
            .map(|d| d.to_string()),
    })
}

/// Top-level keys win over the nested `coordinates` object.
fn coordinate_field(
    map: &Map<String, Value>,
    nested: Option<&Map<String, Value>>,
    keys: &[&str],
) -> Option<CoordinateField> {
    keys.iter()
        .find_map(|key| {
            map.get(*key)
                .or_else(|| nested.and_then(|inner| inner.get(*key)))
        })
        .and_then(CoordinateField::from_value)
}
