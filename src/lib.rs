//! Best-effort recovery of AI-generation prompts embedded in image files.
//!
//! Images produced by AI generators usually carry their prompt somewhere in
//! the container: a PNG text chunk, an EXIF tag, an XMP packet, an IPTC
//! record, or bits hidden in the alpha channel. [`Engine::extract`] fetches
//! just enough of a file through a caller-provided byte source to find it,
//! resolves the most likely prompt text out of whatever it finds, and
//! caches the result keyed by the locator string.
//!
//! The answer is always `Option<String>`. Failures of any kind, from
//! network errors to corrupt containers, degrade to `None`.

pub mod engine;
pub mod locator;

pub use crate::engine::{Engine, JPEG_WINDOW, PNG_BUDGET, PNG_WINDOW};
pub use crate::locator::{ExtensionHint, Kind, Locator};
