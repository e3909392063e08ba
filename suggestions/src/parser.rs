//! Model output parsing.
//!
//! Turns raw completion text into suggestions. Parsing never fails: each
//! strategy below is tried in order and the first one that produces
//! anything wins.
//!
//! 1. A JSON string literal is unwrapped once and its content parsed instead.
//! 2. JSON: a `{"suggestions": [...]}` object, or a bare array. Code fences
//!    and surrounding prose are tolerated.
//! 3. A numbered list with at least two items.
//! 4. Segments separated by blank lines or bullet markers.
//! 5. The whole trimmed text.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

use crate::types::{Suggestion, SuggestionKind};

/// Field names that older or drifting models use for plain suggestion text.
const TEXT_FIELDS: [&str; 4] = ["suggestion", "text", "content", "message"];

static NUMBERED_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)\d{1,2}[.)]\s+").ok());

static SEGMENT_BREAK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)\n[ \t]*\n\s*|•\s*|^[ \t]*[-*][ \t]+").ok());

/// Decode `raw` into between 1 and `requested` suggestions.
///
/// A `requested` of 0 is treated as 1.
pub fn parse(raw: &str, requested: usize) -> Vec<Suggestion> {
    let requested = requested.max(1);

    let text = match unwrap_string_literal(raw) {
        Some(inner) => {
            debug!("Unwrapped double-encoded completion");
            inner
        }
        None => raw.to_string(),
    };

    let suggestions = parse_json(&text)
        .or_else(|| parse_numbered(&text))
        .or_else(|| parse_segments(&text))
        .unwrap_or_else(|| vec![Suggestion::single(text.trim())]);

    suggestions
        .into_iter()
        .map(normalize)
        .take(requested)
        .collect()
}

/// The content of a JSON string literal, when `raw` is exactly one.
fn unwrap_string_literal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('"') {
        return None;
    }
    serde_json::from_str::<String>(trimmed).ok()
}

fn parse_json(text: &str) -> Option<Vec<Suggestion>> {
    let value = json_document(text)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("suggestions") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let suggestions: Vec<Suggestion> = items.into_iter().filter_map(suggestion_from_value).collect();
    debug!("Decoded {} suggestions from JSON", suggestions.len());
    (!suggestions.is_empty()).then_some(suggestions)
}

/// Find a JSON object or array in `text`, allowing code fences and prose
/// around it.
fn json_document(text: &str) -> Option<Value> {
    let unfenced = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    let start = unfenced.find(['{', '['])?;
    let end = unfenced.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&unfenced[start..=end]).ok()
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn suggestion_from_value(value: Value) -> Option<Suggestion> {
    match value {
        Value::String(text) => non_blank(text).map(Suggestion::single),
        Value::Object(mut map) => {
            let tag = map
                .get("kind")
                .or_else(|| map.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string);

            let messages: Vec<String> = match map.remove("messages") {
                Some(Value::Array(items)) => items.into_iter().filter_map(message_text).collect(),
                Some(other) => message_text(other).into_iter().collect(),
                None => TEXT_FIELDS
                    .iter()
                    .find_map(|field| map.remove(*field).and_then(message_text))
                    .into_iter()
                    .collect(),
            };

            if messages.is_empty() {
                return None;
            }

            let kind = match tag {
                Some(tag) => SuggestionKind::from_tag(&tag)?,
                None if messages.len() > 1 => SuggestionKind::Multi,
                None => SuggestionKind::Single,
            };
            Some(Suggestion { kind, messages })
        }
        _ => None,
    }
}

/// Message text for one array element; non-strings are stringified.
fn message_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => non_blank(text),
        other => Some(other.to_string()),
    }
}

fn non_blank(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

fn parse_numbered(text: &str) -> Option<Vec<Suggestion>> {
    let markers: Vec<_> = NUMBERED_MARKER.as_ref()?.find_iter(text).collect();
    if markers.len() < 2 {
        return None;
    }

    let suggestions: Vec<Suggestion> = markers
        .iter()
        .enumerate()
        .filter_map(|(i, marker)| {
            let end = markers.get(i + 1).map_or(text.len(), |next| next.start());
            let span = text[marker.end()..end].trim();
            (!span.is_empty()).then(|| Suggestion::single(span))
        })
        .collect();

    debug!("Decoded {} suggestions from numbered list", suggestions.len());
    (suggestions.len() >= 2).then_some(suggestions)
}

fn parse_segments(text: &str) -> Option<Vec<Suggestion>> {
    let suggestions: Vec<Suggestion> = SEGMENT_BREAK
        .as_ref()?
        .split(text)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(Suggestion::single)
        .collect();

    (!suggestions.is_empty()).then_some(suggestions)
}

/// Enforce the output invariants on one suggestion.
fn normalize(mut suggestion: Suggestion) -> Suggestion {
    for message in &mut suggestion.messages {
        *message = strip_wrapping_quotes(message.trim()).to_string();
    }
    if suggestion.kind == SuggestionKind::Single && suggestion.messages.len() > 1 {
        suggestion.kind = SuggestionKind::Multi;
    }
    suggestion
}

fn strip_wrapping_quotes(text: &str) -> &str {
    const PAIRS: [(char, char); 3] = [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')];

    for (open, close) in PAIRS {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner.trim();
        }
    }
    text
}
