//! Strict JSON tier.

use serde_json::{Map, Value};

use super::{CandidateParser, RawCandidate};

/// Keys under which some models nest the clip array.
const WRAPPER_KEYS: &[&str] = &["clips", "suggestions", "highlights"];

const START_KEYS: &[&str] = &["start", "startTime", "start_time"];
const END_KEYS: &[&str] = &["end", "endTime", "end_time"];
const SCORE_KEYS: &[&str] = &["viralityScore", "virality_score", "viralScore", "score"];
const REASON_KEYS: &[&str] = &["reason", "why"];
const CAPTION_KEYS: &[&str] = &["caption", "description", "title"];
const TYPE_KEYS: &[&str] = &["contentType", "content_type", "type", "category", "hook_category"];
const PEAK_KEYS: &[&str] = &["peakMoment", "peak_moment", "peak"];

/// Remove a leading ```` ```lang ```` line and a trailing ```` ``` ````, then trim.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    let text = text.trim();
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Accepts a JSON array of clip objects, or an object wrapping one.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictJsonParser;

impl CandidateParser for StrictJsonParser {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn parse(&self, text: &str) -> Option<Vec<RawCandidate>> {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return candidates_from_value(&value);
        }

        // Bracketed prose such as "[1]" or "[]" must fall through to the
        // heuristic tier, so an embedded array only counts when it carries
        // at least one bounded clip.
        let candidates = embedded_array(text).and_then(|value| candidates_from_value(&value))?;
        candidates
            .iter()
            .any(RawCandidate::has_bounds)
            .then_some(candidates)
    }
}

/// Last resort for prose around a JSON array: the outermost `[...]` slice.
fn embedded_array(text: &str) -> Option<Value> {
    let open = text.find('[')?;
    let close = text.rfind(']')?;
    if close <= open {
        return None;
    }
    serde_json::from_str::<Value>(&text[open..=close]).ok()
}

fn candidates_from_value(value: &Value) -> Option<Vec<RawCandidate>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => WRAPPER_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))?,
        _ => return None,
    };

    Some(
        items
            .iter()
            .map(|item| match item {
                Value::Object(map) => candidate_from_object(map),
                _ => RawCandidate::default(),
            })
            .collect(),
    )
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key)).filter(|v| !v.is_null())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_number(s),
        _ => None,
    }
}

/// Parse the number at the start of `s`, so "8.5/10" yields 8.5.
pub(super) fn parse_leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

fn candidate_from_object(map: &Map<String, Value>) -> RawCandidate {
    let text = |keys: &[&str]| lookup(map, keys).and_then(as_text);
    RawCandidate {
        start: text(START_KEYS),
        end: text(END_KEYS),
        score: lookup(map, SCORE_KEYS).and_then(as_score),
        reason: text(REASON_KEYS),
        caption: text(CAPTION_KEYS),
        content_type: text(TYPE_KEYS),
        peak_moment: text(PEAK_KEYS),
    }
}
