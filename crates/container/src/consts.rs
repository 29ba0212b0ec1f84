use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// PNG text-chunk keywords whose values are prompt-bearing. Matching is
/// case-insensitive. Values under any other keyword are not worth an inflate.
pub(crate) const PROMPT_KEYS: [&str; 4] = ["parameters", "Description", "Comment", "prompt"];

/// The PNG text-chunk keyword carrying an XMP packet.
pub(crate) const XMP_KEY: &str = "XML:com.adobe.xmp";

pub(crate) fn is_prompt_key(keyword: &str) -> bool {
    PROMPT_KEYS.iter().any(|k| keyword.eq_ignore_ascii_case(k))
}

pub(crate) fn is_xmp_key(keyword: &str) -> bool {
    keyword.eq_ignore_ascii_case(XMP_KEY)
}

// Prompt-bearing XMP attribute values, e.g. exif:UserComment="...".
regex!(RE_XMP_ATTR, r#"(?i)(?:exif:UserComment|tiff:ImageDescription|parameters|prompt)\s*=\s*"([^"]+)""#);
// The same fields expressed as element text.
regex!(RE_XMP_TAG, r"(?is)<(?:exif:UserComment|tiff:ImageDescription|parameters|prompt)[^>]*>(.*?)</");
// dc:description alternative-language containers: the first rdf:li wins.
regex!(RE_XMP_DESC, r"(?is)<dc:description[^>]*>.*?<rdf:Alt[^>]*>.*?<rdf:li[^>]*>(.*?)</rdf:li>");
// rdf:li items carry markup-escaped text; unescape the frequent entities.
pub(crate) const XML_ENTITIES: [(&str, &str); 5] =
    [("&lt;", "<"), ("&gt;", ">"), ("&quot;", "\""), ("&apos;", "'"), ("&amp;", "&")];
