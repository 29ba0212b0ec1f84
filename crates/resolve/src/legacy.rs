//! Legacy plain-text prompt blobs.
//!
//! The oldest embedding format is a single text blob: positive tags, an
//! optional `Negative prompt:` header, and trailing `Key: value` settings
//! lines. Splitting is lossless enough for display: tags keep their
//! original spelling apart from weight-notation normalization.

use crate::consts::{RE_SETTINGS_LINE, RE_WEIGHT_TAG};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static RE_NEGATIVE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)negative\s+prompt\s*:").unwrap());

/// A legacy prompt blob split into its three sections.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LegacyPrompt {
    /// Positive tags, comma-split, weight notation normalized.
    pub positive: Vec<String>,
    /// Negative tags, same treatment.
    pub negative: Vec<String>,
    /// `Key: value` settings lifted out of header-style lines.
    pub settings: BTreeMap<String, String>,
}

/// Split a legacy text blob at its `Negative prompt:` header, strip
/// settings lines out of both halves, and tag-split what remains.
pub fn split_legacy(text: &str) -> LegacyPrompt {
    let (positive_blob, negative_blob) = match RE_NEGATIVE_HEADER.find(text) {
        Some(header) => (&text[..header.start()], &text[header.end()..]),
        None => (text, ""),
    };
    let mut prompt = LegacyPrompt::default();
    let positive_prose = strip_settings(positive_blob, &mut prompt.settings);
    let negative_prose = strip_settings(negative_blob, &mut prompt.settings);
    prompt.positive = split_tags(&positive_prose);
    prompt.negative = split_tags(&negative_prose);
    prompt
}

/// Remove capitalized `Key: value` header lines, collecting their pairs,
/// and return the remaining prose.
fn strip_settings(blob: &str, settings: &mut BTreeMap<String, String>) -> String {
    let mut prose: Vec<&str> = Vec::new();
    for line in blob.lines() {
        if RE_SETTINGS_LINE.is_match(line) {
            collect_pairs(line, settings);
        } else if !line.trim().is_empty() {
            prose.push(line.trim());
        }
    }
    prose.join(", ")
}

/// One settings line holds comma-separated pairs; a piece without its own
/// `Key:` belongs to the previous value (e.g. a model name with a comma).
fn collect_pairs(line: &str, settings: &mut BTreeMap<String, String>) {
    let mut last_key: Option<String> = None;
    for piece in line.split(',') {
        let piece = piece.trim();
        match piece.split_once(':') {
            Some((key, value))
                if key.chars().next().is_some_and(|c| c.is_ascii_uppercase()) =>
            {
                let key = key.trim().to_string();
                settings.insert(key.clone(), value.trim().to_string());
                last_key = Some(key);
            },
            _ => {
                if let Some(entry) =
                    last_key.as_ref().and_then(|key| settings.get_mut(key))
                {
                    entry.push_str(", ");
                    entry.push_str(piece);
                }
            },
        }
    }
}

/// Split on commas that are outside `()`/`<>` groups and not escaped.
pub fn split_tags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut current = String::new();
    let mut depth = 0u32;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            },
            '(' | '<' => {
                depth += 1;
                current.push(c);
            },
            ')' | '>' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            },
            ',' if depth == 0 => {
                push_tag(&mut tags, &current);
                current.clear();
            },
            _ => current.push(c),
        }
    }
    push_tag(&mut tags, &current);
    tags
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        tags.push(normalize_weight_tag(trimmed));
    }
}

/// Normalize `(tag: 1.2)` and `tag: 1.2` weight notation to `tag (×1.2)`.
pub fn normalize_weight_tag(tag: &str) -> String {
    match RE_WEIGHT_TAG.captures(tag) {
        Some(captures) => format!("{} (×{})", &captures[1], &captures[2]),
        None => tag.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_split_with_negative_and_settings() {
        let prompt = split_legacy("foo, bar\nNegative prompt:\nbaz\nSteps: 20");
        assert_eq!(prompt.positive, ["foo", "bar"]);
        assert_eq!(prompt.negative, ["baz"]);
        assert_eq!(prompt.settings.get("Steps").unwrap(), "20");
    }

    #[test]
    fn test_no_negative_header() {
        let prompt = split_legacy("a lone lighthouse, storm clouds");
        assert_eq!(prompt.positive, ["a lone lighthouse", "storm clouds"]);
        assert!(prompt.negative.is_empty());
        assert!(prompt.settings.is_empty());
    }

    #[test]
    fn test_settings_line_with_many_pairs() {
        let prompt = split_legacy(
            "sunset\nNegative prompt: dull\nSteps: 30, Sampler: DPM++ 2M, CFG scale: 7, Seed: 42",
        );
        assert_eq!(prompt.settings.get("Sampler").unwrap(), "DPM++ 2M");
        assert_eq!(prompt.settings.get("CFG scale").unwrap(), "7");
        assert_eq!(prompt.settings.get("Seed").unwrap(), "42");
        assert_eq!(prompt.negative, ["dull"]);
    }

    #[test]
    fn test_commas_inside_groups_do_not_split() {
        let tags = split_tags("a (b, c) d, <lora:x,y>, plain");
        assert_eq!(tags, ["a (b, c) d", "<lora:x,y>", "plain"]);
    }

    #[test]
    fn test_escaped_comma_does_not_split() {
        assert_eq!(split_tags(r"one\, still one, two"), [r"one\, still one", "two"]);
    }

    #[rstest]
    #[case("(masterpiece: 1.2)", "masterpiece (×1.2)")]
    #[case("masterpiece:1.2", "masterpiece (×1.2)")]
    #[case("best quality", "best quality")]
    #[case("<lora:foo:0.8>", "<lora:foo:0.8>")]
    fn test_normalize_weight_tag(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_weight_tag(input), expected);
    }

    #[test]
    fn test_settings_value_containing_comma() {
        let prompt = split_legacy("p\nModel: foo, v2 edition, Seed: 9");
        // "v2 edition" has no key of its own and rejoins the model name.
        assert_eq!(prompt.settings.get("Model").unwrap(), "foo, v2 edition");
        assert_eq!(prompt.settings.get("Seed").unwrap(), "9");
    }
}
