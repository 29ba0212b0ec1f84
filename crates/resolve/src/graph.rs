//! Node-graph workflow traversal.
//!
//! A workflow is a `nodes` array of objects carrying a class name, an
//! optional title, an `inputs` map and/or a `widgets_values` array. Prompt
//! text may sit directly on a node or behind a `[nodeId, slot]` link
//! reference to another node; links are followed a few hops at most.

use crate::consts::{
    EXCLUDED_PATTERNS, NODE_TEXT_KEYS, UTILITY_CLASSES, is_high_value_class,
    is_text_encode_class,
};
use serde_json::Value;

/// Maximum link-reference hops when chasing a node's text input.
const MAX_LINK_DEPTH: usize = 4;

pub(crate) fn resolve_nodes(nodes: &[Value], label_threshold: usize) -> Option<String> {
    // Nodes whose class alone identifies them as the prompt carrier.
    for node in nodes {
        if is_high_value_class(node_class(node)) {
            if let Some(text) = node_text(node, nodes, MAX_LINK_DEPTH) {
                return Some(text);
            }
        }
    }
    // Text-encode nodes explicitly titled as the positive conditioning.
    for node in nodes {
        let title = node_title(node).to_ascii_lowercase();
        if is_text_encode_class(node_class(node))
            && title.contains("positive")
            && !title.contains("negative")
        {
            if let Some(text) = node_text(node, nodes, MAX_LINK_DEPTH) {
                return Some(text);
            }
        }
    }
    // Scored walk over everything else; first-found wins ties.
    let mut best: Option<(i32, String)> = None;
    for node in nodes {
        let Some(text) = node_text(node, nodes, MAX_LINK_DEPTH) else {
            continue;
        };
        let score = score_node(node, &text, label_threshold);
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, text));
        }
    }
    best.filter(|(score, _)| *score > 0).map(|(_, text)| text)
}

fn node_class(node: &Value) -> &str {
    node["type"].as_str().or_else(|| node["class_type"].as_str()).unwrap_or("")
}

fn node_title(node: &Value) -> &str {
    node["title"].as_str().or_else(|| node["_meta"]["title"].as_str()).unwrap_or("")
}

fn node_by_id<'a>(nodes: &'a [Value], id: &Value) -> Option<&'a Value> {
    // Ids appear as numbers in some writers and strings in others.
    let wanted = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    nodes.iter().find(|node| match &node["id"] {
        Value::String(s) => *s == wanted,
        other => other.to_string() == wanted,
    })
}

/// Pull prompt-like text off a node: direct string inputs first, then link
/// references (one `[nodeId, slot]` hop per depth level), then widget
/// values.
fn node_text(node: &Value, nodes: &[Value], depth: usize) -> Option<String> {
    if let Some(inputs) = node["inputs"].as_object() {
        for key in NODE_TEXT_KEYS {
            match inputs.get(key) {
                Some(Value::String(text)) if !text.trim().is_empty() => {
                    return Some(text.trim().to_string());
                },
                Some(Value::Array(link)) if depth > 0 => {
                    if let Some(target) = link.first().and_then(|id| node_by_id(nodes, id)) {
                        if let Some(text) = node_text(target, nodes, depth - 1) {
                            return Some(text);
                        }
                    }
                },
                _ => {},
            }
        }
    }
    node["widgets_values"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// `true` for short unspaced machine labels that only look like prompts.
pub(crate) fn is_labely(text: &str, threshold: usize) -> bool {
    crate::consts::RE_LABELY.is_match(text)
        || (!text.contains(char::is_whitespace) && text.chars().count() < threshold)
}

fn score_node(node: &Value, text: &str, label_threshold: usize) -> i32 {
    let class = node_class(node);
    let title = node_title(node).to_ascii_lowercase();
    let class_lower = class.to_ascii_lowercase();

    let mut score = 0i32;
    if title.contains("positive") {
        score += 1000;
    }
    if title.contains("negative") {
        score -= 1000;
    }
    if is_text_encode_class(class) {
        score += 120;
    }
    if is_high_value_class(class) {
        score += 300;
    }
    score += text.chars().count().min(220) as i32;
    if EXCLUDED_PATTERNS.iter().any(|p| title.contains(p) || class_lower.contains(p)) {
        score -= 900;
    }
    if UTILITY_CLASSES.iter().any(|p| class_lower.contains(p)) {
        score -= 400;
    }
    if is_labely(text, label_threshold) {
        score -= 500;
    }
    score
}
