//! Heuristic prompt resolution.
//!
//! Candidate payloads arrive as arbitrary text: a clean JSON object, a JSON
//! blob buried inside other text, an escaped-JSON string inside a JSON
//! string, a node-graph workflow, or a legacy plain-text blob. [`Resolver`]
//! digs the most likely prompt string out of the JSON shapes; the
//! [`legacy`] module splits plain-text blobs that need no digging.
//!
//! Resolution never errors. A payload nothing matches simply yields `None`
//! and the caller decides what that means (usually: keep the raw text, or
//! drop the candidate).

mod consts;
mod flat;
mod graph;
pub mod legacy;

pub use legacy::{LegacyPrompt, normalize_weight_tag, split_legacy, split_tags};

use crate::consts::{RE_CLIP_POSITIVE, RE_JSON_STRING, RE_PROMPT_KEY, RE_WORKFLOW_KEY};
use serde_json::Value;
use tracing::instrument;

/// Prompt resolver with its one tunable: the length under which unspaced
/// text is treated as a machine label rather than a prompt.
#[derive(Clone, Copy, Debug)]
pub struct Resolver {
    pub label_length_threshold: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self { label_length_threshold: 24 }
    }
}

impl Resolver {
    pub fn new(label_length_threshold: usize) -> Self {
        Self { label_length_threshold }
    }

    /// Extract the most likely prompt from arbitrary candidate text.
    ///
    /// Tries the raw text first; if that fails and the text carries escaped
    /// quotes, unescapes once and tries again, which covers JSON embedded
    /// as a string value inside other JSON.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn resolve(&self, text: &str) -> Option<String> {
        if let Some(hit) = self.resolve_pass(text) {
            return Some(hit);
        }
        if text.contains("\\\"") {
            return self.resolve_pass(&unescape_once(text));
        }
        None
    }

    fn resolve_pass(&self, text: &str) -> Option<String> {
        if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
            if let Some(hit) = self.resolve_value(&value) {
                return Some(hit);
            }
        }
        self.resolve_prompt_key(text)
            .or_else(|| self.resolve_workflow_key(text))
            .or_else(|| resolve_clip_positive(text))
    }

    /// Find `"prompt":` anywhere in the text and lift out its value, which
    /// may be a plain string, a nested object, or a string that is itself
    /// escaped JSON.
    fn resolve_prompt_key(&self, text: &str) -> Option<String> {
        for found in RE_PROMPT_KEY.find_iter(text) {
            let tail = &text[found.end()..];
            match tail.as_bytes().first() {
                Some(b'{') => {
                    let Some(object) = balanced_object(text, found.end()) else {
                        continue;
                    };
                    let Ok(value) = serde_json::from_str::<Value>(object) else {
                        continue;
                    };
                    if let Some(hit) = self.resolve_value(&value) {
                        return Some(hit);
                    }
                },
                Some(b'"') => {
                    let Some(string) = json_string_at(tail) else {
                        continue;
                    };
                    if let Some(hit) = self.resolve_value(&Value::String(string)) {
                        return Some(hit);
                    }
                },
                _ => {},
            }
        }
        None
    }

    fn resolve_workflow_key(&self, text: &str) -> Option<String> {
        for found in RE_WORKFLOW_KEY.find_iter(text) {
            // The match ends on the opening brace.
            let Some(object) = balanced_object(text, found.end() - 1) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(object) else {
                continue;
            };
            if let Some(hit) = self.resolve_value(&value) {
                return Some(hit);
            }
        }
        None
    }

    fn resolve_value(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                // A string value that is itself JSON gets one more level.
                if trimmed.starts_with('{') {
                    if let Ok(inner) = serde_json::from_str::<Value>(trimmed) {
                        if let Some(hit) = self.resolve_value(&inner) {
                            return Some(hit);
                        }
                    }
                }
                Some(trimmed.to_string())
            },
            Value::Object(obj) => match obj.get("nodes").and_then(Value::as_array) {
                Some(nodes) => graph::resolve_nodes(nodes, self.label_length_threshold),
                None => flat::resolve_flat(obj),
            },
            _ => None,
        }
    }
}

/// A positive-titled text-encode node matched textually, for payloads too
/// mangled to parse as JSON.
fn resolve_clip_positive(text: &str) -> Option<String> {
    let captures = RE_CLIP_POSITIVE.captures(text)?;
    let raw = captures.get(1)?.as_str();
    let unquoted = serde_json::from_str::<String>(&format!("\"{raw}\""))
        .unwrap_or_else(|_| raw.replace("\\\"", "\""));
    let trimmed = unquoted.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Extract the `{...}` starting at `start`, balancing braces outside of
/// string literals.
fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for i in start..bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return text.get(start..=i);
                }
            },
            _ => {},
        }
    }
    None
}

/// Parse the JSON string literal at the start of `text`.
fn json_string_at(text: &str) -> Option<String> {
    let token = RE_JSON_STRING.find(text)?;
    serde_json::from_str::<String>(token.as_str()).ok()
}

/// Undo one level of JSON string escaping.
fn unescape_once(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
