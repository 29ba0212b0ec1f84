//! Resource locator classification.
//!
//! A locator is the caller's string, kept verbatim as the cache key. The
//! parsed view only informs strategy choices: which fetch window to start
//! with, and whether to skip extraction entirely.

use std::path::PathBuf;

/// Extensions that mark a resource as video; extraction is skipped.
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "webm", "mkv", "mov", "avi", "m4v"];
/// Extensions steering the initial fetch toward the JPEG strategy.
const JPEG_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "webp"];

/// Where the bytes live.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    /// An opaque non-file scheme handle (e.g. `content://...`).
    Handle,
    /// A local filesystem path.
    File(PathBuf),
    /// A remote `http(s)` URL.
    Url,
}

/// What the name suggests the container is. The format sniff has the final
/// say; this only picks the first fetch window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExtensionHint {
    Jpeg,
    Png,
    Video,
    Unknown,
}

/// A parsed resource locator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Locator {
    raw: String,
    kind: Kind,
}

impl Locator {
    pub fn parse(raw: &str) -> Self {
        let kind = if raw.starts_with("http://") || raw.starts_with("https://") {
            Kind::Url
        } else if let Some(path) = raw.strip_prefix("file://") {
            Kind::File(PathBuf::from(path))
        } else if raw.contains("://") {
            Kind::Handle
        } else {
            Kind::File(PathBuf::from(raw))
        };
        Self { raw: raw.to_string(), kind }
    }

    /// The verbatim input string; the cache key.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_remote(&self) -> bool {
        self.kind == Kind::Url
    }

    /// The trailing path segment, query string and fragment stripped.
    pub fn file_name(&self) -> &str {
        let path = self.raw.split(['?', '#']).next().unwrap_or(&self.raw);
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    pub fn extension_hint(&self) -> ExtensionHint {
        let name = self.file_name();
        let Some((_, ext)) = name.rsplit_once('.') else {
            return ExtensionHint::Unknown;
        };
        let ext = ext.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            ExtensionHint::Video
        } else if JPEG_EXTENSIONS.contains(&ext.as_str()) {
            ExtensionHint::Jpeg
        } else if ext == "png" {
            ExtensionHint::Png
        } else {
            ExtensionHint::Unknown
        }
    }

    /// Screenshots never carry generation metadata; skip them outright.
    pub fn is_screenshot(&self) -> bool {
        self.raw.to_ascii_lowercase().contains("screenshot")
    }
}
