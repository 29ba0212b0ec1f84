use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// A prompt key whose value follows immediately; the value itself is pulled
// out by a balanced scan, not by the regex.
regex!(RE_PROMPT_KEY, r#""prompt"\s*:\s*"#);
// An embedded node-graph workflow object.
regex!(RE_WORKFLOW_KEY, r#""workflow"\s*:\s*\{"#);
// A positive-titled text-encode node with its text in field order.
regex!(
    RE_CLIP_POSITIVE,
    r#"(?is)CLIPTextEncode.{0,512}?"title"\s*:\s*"[^"]*positive[^"]*".{0,512}?"(?:text|string)"\s*:\s*"((?:\\.|[^"\\])*)""#
);
// A JSON string token, used to lift a quoted prompt value out of raw text.
regex!(RE_JSON_STRING, r#"^"((?:\\.|[^"\\])*)""#);
// Short machine labels that masquerade as prompt text.
regex!(RE_LABELY, r"^(?:TxtEmb|TextEmb)");
// A `Key: value` generation-settings header line in legacy prompt text.
regex!(RE_SETTINGS_LINE, r"^\s*[A-Z][A-Za-z0-9 _-]*:\s*\S");
// `tag: 1.2` weight notation, with or without enclosing parentheses.
regex!(RE_WEIGHT_TAG, r"^\(?\s*([^:()]+?)\s*:\s*([0-9]*\.?[0-9]+)\s*\)?$");

/// Node classes that almost always hold the user's actual prompt.
pub(crate) const HIGH_VALUE_CLASSES: [&str; 3] =
    ["ImpactWildcardProcessor", "WanVideoTextEncodeSingle", "WanVideoTextEncode"];

/// Text-encode node families worth a moderate boost.
pub(crate) const TEXT_ENCODE_CLASSES: [&str; 3] =
    ["CLIPTextEncode", "TextEncode", "T5TextEncode"];

/// Title or class fragments that mark a node as definitely not the prompt.
pub(crate) const EXCLUDED_PATTERNS: [&str; 4] = ["mosaic", "mask", "embedding", "censor"];

/// Utility node families whose text fields are labels, formulas or paths.
pub(crate) const UTILITY_CLASSES: [&str; 6] =
    ["display", "preview", "seed", "note", "primitive", "show"];

/// Input keys checked, in order, when pulling text out of a graph node.
pub(crate) const NODE_TEXT_KEYS: [&str; 5] =
    ["text", "prompt", "positive_prompt", "wildcard_text", "string"];

pub(crate) fn is_high_value_class(class: &str) -> bool {
    HIGH_VALUE_CLASSES.iter().any(|c| class.eq_ignore_ascii_case(c))
}

pub(crate) fn is_text_encode_class(class: &str) -> bool {
    let lower = class.to_ascii_lowercase();
    TEXT_ENCODE_CLASSES.iter().any(|c| lower.contains(&c.to_ascii_lowercase()))
}
