//! Flat generation-metadata objects.
//!
//! These are the simple key/value payloads written by non-graph generators.
//! Resolution reassembles them into the legacy one-blob layout (positive
//! text, a `Negative prompt:` line, a settings line) so downstream
//! consumers can treat every source uniformly.

use serde_json::{Map, Value};

/// The registry URL synthesized from a bare numeric `modelId`.
const MODEL_REGISTRY_URL: &str = "https://civitai.com/models";

pub(crate) fn resolve_flat(obj: &Map<String, Value>) -> Option<String> {
    let positive = get_str(obj, "prompt")
        .or_else(|| nested_caption(obj.get("prompt")))
        .or_else(|| nested_caption(obj.get("caption")))
        .or_else(|| nested_caption(obj.get("v4_prompt")))?;

    let negative = get_str(obj, "negative_prompt")
        .or_else(|| get_str(obj, "uc"))
        .or_else(|| nested_caption(obj.get("v4_negative_prompt")));

    let mut out = positive;
    if let Some(negative) = negative.filter(|n| !n.is_empty()) {
        out.push_str("\nNegative prompt: ");
        out.push_str(&negative);
    }
    let settings = settings_line(obj);
    if !settings.is_empty() {
        out.push('\n');
        out.push_str(&settings);
    }
    Some(out)
}

/// A `caption` or `v4_prompt` object, whose text sits at `base_caption` or
/// one level down at `caption.base_caption`.
fn nested_caption(value: Option<&Value>) -> Option<String> {
    let obj = value?.as_object()?;
    if let Some(direct) = get_str(obj, "base_caption") {
        return Some(direct);
    }
    get_str(obj.get("caption")?.as_object()?, "base_caption")
}

fn get_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| scalar(v))
        .filter(|s| !s.is_empty())
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn settings_line(obj: &Map<String, Value>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut push = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            parts.push(format!("{label}: {value}"));
        }
    };
    push("Steps", get_str(obj, "steps"));
    push("Sampler", get_str(obj, "sampler"));
    push("CFG scale", get_str(obj, "cfg").or_else(|| get_str(obj, "scale")));
    push("Seed", get_str(obj, "seed"));
    push("Size", size_of(obj));
    push("Model", get_str(obj, "model"));
    push("Model hash", get_str(obj, "model_hash").or_else(|| get_str(obj, "model hash")));
    push(
        "Model URL",
        get_str(obj, "modelid").map(|id| format!("{MODEL_REGISTRY_URL}/{id}")),
    );
    parts.join(", ")
}

fn size_of(obj: &Map<String, Value>) -> Option<String> {
    if let (Some(w), Some(h)) = (get_str(obj, "width"), get_str(obj, "height")) {
        return Some(format!("{w}x{h}"));
    }
    get_str(obj, "resolution")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(value: Value) -> Option<String> {
        resolve_flat(value.as_object().unwrap())
    }

    #[test]
    fn test_prompt_only() {
        assert_eq!(resolve(json!({"prompt": "a, b, c"})).unwrap(), "a, b, c");
    }

    #[test]
    fn test_negative_and_settings() {
        let out = resolve(json!({
            "prompt": "castle on a hill",
            "uc": "lowres, bad anatomy",
            "steps": 28,
            "sampler": "k_euler_ancestral",
            "scale": 5.5,
            "seed": 1234567890u64,
            "width": 832,
            "height": 1216,
        }))
        .unwrap();
        assert_eq!(
            out,
            "castle on a hill\nNegative prompt: lowres, bad anatomy\n\
             Steps: 28, Sampler: k_euler_ancestral, CFG scale: 5.5, Seed: 1234567890, Size: 832x1216"
        );
    }

    #[test]
    fn test_v4_nested_caption() {
        let out = resolve(json!({
            "v4_prompt": {"caption": {"base_caption": "girl under cherry blossoms"}},
            "v4_negative_prompt": {"caption": {"base_caption": "blurry"}},
        }))
        .unwrap();
        assert!(out.starts_with("girl under cherry blossoms"));
        assert!(out.contains("Negative prompt: blurry"));
    }

    #[test]
    fn test_model_registry_url() {
        let out = resolve(json!({"prompt": "p", "modelId": 4384})).unwrap();
        assert!(out.contains("Model URL: https://civitai.com/models/4384"));
    }

    #[test]
    fn test_no_prompt_means_none() {
        assert_eq!(resolve(json!({"steps": 20, "seed": 5})), None);
    }
}
