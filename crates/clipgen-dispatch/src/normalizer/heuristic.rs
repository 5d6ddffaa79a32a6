//! Free-text recovery tier.
//!
//! Scans `key: value` lines as a small state machine. A `start:` line opens
//! a new candidate and closes the previous one, which is kept only if it has
//! both bounds. Unknown `key: value` lines become caption text until the
//! candidate's `type:` line is seen.

use regex::Regex;

use super::strict::parse_leading_number;
use super::{CandidateParser, RawCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKey {
    Start,
    End,
    Score,
    Reason,
    Caption,
    Type,
    Peak,
    Other,
}

impl LineKey {
    fn from_label(label: &str) -> Self {
        let label: String = label
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match label.as_str() {
            "start" | "starttime" | "begin" => LineKey::Start,
            "end" | "endtime" | "finish" => LineKey::End,
            "score" | "virality" | "viralityscore" | "viralscore" => LineKey::Score,
            "reason" | "why" => LineKey::Reason,
            "caption" | "title" => LineKey::Caption,
            "type" | "contenttype" | "category" => LineKey::Type,
            "peak" | "peakmoment" => LineKey::Peak,
            _ => LineKey::Other,
        }
    }
}

#[derive(Debug, Default)]
struct OpenCandidate {
    candidate: RawCandidate,
    caption_text: Vec<String>,
    type_seen: bool,
}

impl OpenCandidate {
    fn close(mut self) -> RawCandidate {
        if self.candidate.caption.is_none() && !self.caption_text.is_empty() {
            self.candidate.caption = Some(self.caption_text.join(" "));
        }
        self.candidate
    }
}

/// Line-oriented parser for answers that ignored the JSON contract.
pub struct HeuristicLineParser {
    line_pattern: Regex,
}

impl Default for HeuristicLineParser {
    fn default() -> Self {
        Self {
            // optional bullet/numbering, optional markdown emphasis around the label
            line_pattern: Regex::new(
                r"^\s*(?:[-*•>]+\s*|\d+[.)]\s*)?\**\s*([A-Za-z][A-Za-z _-]{0,30}?)\s*\**\s*:\s*(.*)$",
            )
            .expect("valid heuristic line regex"),
        }
    }
}

fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '`')
        .trim()
        .to_string()
}

fn clean_line(line: &str) -> String {
    line.trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•' || c == '>')
        .replace("**", "")
        .trim()
        .to_string()
}

impl CandidateParser for HeuristicLineParser {
    fn name(&self) -> &'static str {
        "heuristic_lines"
    }

    fn parse(&self, text: &str) -> Option<Vec<RawCandidate>> {
        let mut candidates = Vec::new();
        let mut current: Option<OpenCandidate> = None;

        for line in text.lines() {
            if !line.contains(':') {
                continue;
            }

            let (key, value) = match self.line_pattern.captures(line) {
                Some(caps) => (
                    LineKey::from_label(caps.get(1).map_or("", |m| m.as_str())),
                    clean_value(caps.get(2).map_or("", |m| m.as_str())),
                ),
                None => (LineKey::Other, String::new()),
            };

            if key == LineKey::Start {
                if let Some(previous) = current.take() {
                    let previous = previous.close();
                    if previous.has_bounds() {
                        candidates.push(previous);
                    }
                }
                current = Some(OpenCandidate {
                    candidate: RawCandidate {
                        start: Some(value),
                        ..RawCandidate::default()
                    },
                    ..OpenCandidate::default()
                });
                continue;
            }

            let Some(open) = current.as_mut() else {
                continue;
            };

            match key {
                LineKey::Start => {}
                LineKey::End => open.candidate.end = Some(value),
                LineKey::Score => {
                    if let Some(score) = parse_leading_number(&value) {
                        open.candidate.score = Some(score);
                    }
                }
                LineKey::Reason => open.candidate.reason = Some(value),
                LineKey::Caption => open.candidate.caption = Some(value),
                LineKey::Peak => open.candidate.peak_moment = Some(value),
                LineKey::Type => {
                    open.candidate.content_type = Some(value);
                    open.type_seen = true;
                }
                LineKey::Other => {
                    // Bare headers such as "Clip 2:" carry no caption text
                    let has_value = line
                        .split_once(':')
                        .map_or(false, |(_, rest)| !rest.trim().trim_matches('*').is_empty());
                    if !open.type_seen && has_value {
                        open.caption_text.push(clean_line(line));
                    }
                }
            }
        }

        if let Some(trailing) = current.take() {
            candidates.push(trailing.close());
        }

        if candidates.is_empty() {
            None
        } else {
            Some(candidates)
        }
    }
}
