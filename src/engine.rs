//! Extraction orchestrator.
//!
//! Sequences the whole pipeline: feature gate, skip heuristics, cache
//! lookup, gated range fetches, container parsing, steganography fallback,
//! prompt resolution and cache write-back. The public contract is a plain
//! `Option<String>`: every internal failure is logged and degrades to the
//! next strategy or to "no result", never to an error.

use crate::locator::{ExtensionHint, Locator};
use imprint_cache::PromptCache;
use imprint_config::Config;
use imprint_container::{Candidate, Format, Provenance, exif, jpeg, png, scan};
use imprint_fetch::{ByteWindow, FetchGate, FileSource, SourceHandle};
use imprint_resolve::Resolver;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// First (and only) window fetched for JPEG-strategy resources. Metadata
/// segments sit at the front of the file.
pub const JPEG_WINDOW: u64 = 128 * 1024;
/// Window size for PNG-strategy fetches.
pub const PNG_WINDOW: u64 = 256 * 1024;
/// Total bytes fetched for a PNG before giving up on finding `IEND`.
pub const PNG_BUDGET: u64 = 1024 * 1024;

/// The extraction engine. One instance is shared by all callers; it owns
/// the fetch gate and the cache handle.
pub struct Engine {
    config: Config,
    gate: FetchGate,
    cache: PromptCache,
    resolver: Resolver,
    render_cache: Option<PathBuf>,
}

impl Engine {
    pub fn new(config: Config, cache: PromptCache) -> Self {
        let gate = FetchGate::new(config.concurrency);
        let resolver = Resolver::new(config.resolver.label_length_threshold);
        Self { config, gate, cache, resolver, render_cache: None }
    }

    /// Let the engine read remote resources straight out of a disk-backed
    /// render cache directory when the bytes are already there.
    pub fn with_render_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.render_cache = Some(dir.into());
        self
    }

    /// Apply a new concurrency setting; permits already granted stay valid.
    pub async fn set_concurrency(&self, permits: usize) {
        self.gate.resize(permits).await;
    }

    /// Land buffered cache writes; call on teardown.
    pub async fn flush(&self) {
        if let Err(error) = self.cache.flush().await {
            warn!(%error, "prompt cache flush failed");
        }
    }

    /// Best-effort prompt extraction for one resource.
    ///
    /// `locator` is used verbatim as the cache key; `source` provides the
    /// bytes it addresses. Returns `None` for disabled, skipped,
    /// unsupported, timed-out and genuinely promptless inputs alike.
    #[instrument(skip(self, source), fields(source = source.name()))]
    pub async fn extract(&self, locator: &str, source: SourceHandle) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let locator = Locator::parse(locator);
        if locator.extension_hint() == ExtensionHint::Video {
            debug!("skipping video resource");
            return None;
        }
        if locator.is_screenshot() {
            debug!("skipping screenshot");
            return None;
        }
        match self.cache.get(locator.raw()).await {
            Ok(Some(hit)) => return Some(hit),
            Ok(None) => {},
            Err(error) => debug!(%error, "cache read failed"),
        }
        let source = self.reroute(&locator, source).await;
        let budget = Duration::from_millis(self.config.timeout_ms);
        let found = match tokio::time::timeout(budget, self.extract_uncached(&locator, &source)).await
        {
            Ok(found) => found?,
            Err(_) => {
                warn!("extraction timed out");
                return None;
            },
        };
        self.cache.put(locator.raw(), &found);
        Some(found)
    }

    /// Swap a remote source for a local one when the render cache already
    /// holds the file.
    async fn reroute(&self, locator: &Locator, source: SourceHandle) -> SourceHandle {
        let Some(dir) = &self.render_cache else {
            return source;
        };
        if !locator.is_remote() {
            return source;
        }
        let path = dir.join(locator.file_name());
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                debug!(path = %path.display(), "reading from local render cache");
                Arc::new(FileSource::new(path))
            },
            _ => source,
        }
    }

    async fn extract_uncached(&self, locator: &Locator, source: &SourceHandle) -> Option<String> {
        let known_length = self.probe_length(source).await;
        let first_window = match locator.extension_hint() {
            ExtensionHint::Jpeg => JPEG_WINDOW,
            _ => PNG_WINDOW,
        };
        let first_window = known_length.map_or(first_window, |len| len.min(first_window));
        let buf = self.fetch_window(source, 0, first_window).await?;
        if buf.is_empty() {
            return None;
        }
        // The sniff always overrides the extension hint.
        match Format::sniff(&buf) {
            Format::Png => self.extract_png(source, buf).await,
            Format::Other => self.extract_other(&buf),
        }
    }

    /// Gated length probe under its own short timeout. The result is only a
    /// window-sizing hint, so waiting on the gate and every failure alike
    /// degrade to "unknown".
    async fn probe_length(&self, source: &SourceHandle) -> Option<u64> {
        let sniff = Duration::from_millis(self.config.sniff_timeout_ms);
        let gated = async {
            let _permit = self.gate.acquire().await.ok()?;
            match source.head_length().await {
                Ok(length) => length,
                Err(error) => {
                    debug!(%error, "length probe failed");
                    None
                },
            }
        };
        match tokio::time::timeout(sniff, gated).await {
            Ok(length) => length,
            Err(_) => {
                debug!("length probe timed out");
                None
            },
        }
    }

    /// One gated, clamped range read. Failures degrade to `None`.
    async fn fetch_window(&self, source: &SourceHandle, offset: u64, length: u64) -> Option<Vec<u8>> {
        let window = ByteWindow::clamped(offset, length);
        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(error) => {
                debug!(%error, "fetch gate unavailable");
                return None;
            },
        };
        match source.fetch_range(window.offset, window.length).await {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                debug!(%error, source = source.name(), offset, "range fetch failed");
                None
            },
        }
    }

    /// PNG strategy: windows are appended until `IEND`, end of file, or the
    /// byte budget; text chunks win, steganography is the fallback.
    async fn extract_png(&self, source: &SourceHandle, mut buf: Vec<u8>) -> Option<String> {
        loop {
            if png::scan(&buf).saw_iend || buf.len() as u64 >= PNG_BUDGET {
                break;
            }
            match self.fetch_window(source, buf.len() as u64, PNG_WINDOW).await {
                Some(more) if !more.is_empty() => buf.extend_from_slice(&more),
                // Fetch failure or EOF: parse what we have.
                _ => break,
            }
        }
        let parsed = png::scan(&buf);

        let texts: Vec<&Candidate> =
            parsed.candidates.iter().filter(|c| c.provenance == Provenance::PngText).collect();
        if !texts.is_empty() {
            let joined = texts.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");
            if let Some(found) = self.accept(&Candidate::new(joined, Provenance::PngText)) {
                return Some(found);
            }
        }
        for candidate in parsed.candidates.iter().filter(|c| c.requires_resolution()) {
            if let Some(found) = self.accept(candidate) {
                return Some(found);
            }
        }
        let ihdr = parsed.ihdr?;
        if parsed.idat.is_empty() {
            return None;
        }
        match imprint_stego::decode(&ihdr, &parsed.idat) {
            Ok(Some(payload)) => self.accept(&Candidate::new(payload, Provenance::AlphaStego)),
            Ok(None) => None,
            Err(error) => {
                debug!(%error, "steganography decode failed");
                None
            },
        }
    }

    /// Non-PNG strategy: JPEG segment walk (or bare EXIF for raw TIFF
    /// buffers), then a raw text scan of the window.
    fn extract_other(&self, buf: &[u8]) -> Option<String> {
        let mut candidates = Vec::new();
        if buf.starts_with(&[0xFF, 0xD8]) {
            candidates.extend(jpeg::scan(buf));
        } else if let Some(candidate) = exif::extract(buf) {
            candidates.push(candidate);
        }
        if let Some(found) = candidates.iter().find_map(|candidate| self.accept(candidate)) {
            return Some(found);
        }
        // Segments produced nothing usable (none, or only blank values);
        // scan the raw window before giving up.
        scan::raw_scan(buf).iter().find_map(|candidate| self.accept(candidate))
    }

    /// Turn a candidate into a final prompt, or reject it.
    ///
    /// Extracted-text candidates fall back to their verbatim text when the
    /// resolver finds nothing; raw-scan and unparsed-manifest candidates
    /// are only meaningful when the resolver finds a prompt inside them.
    fn accept(&self, candidate: &Candidate) -> Option<String> {
        if candidate.is_blank() {
            return None;
        }
        let resolved = self.resolver.resolve(&candidate.text);
        let text = match candidate.requires_resolution() {
            true => resolved?,
            false => resolved.unwrap_or_else(|| candidate.text.clone()),
        };
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "UNICODE" {
            return None;
        }
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imprint_fetch::MockSource;

    const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn chunk(ctype: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(ctype);
        out.extend_from_slice(data);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(ctype);
        hasher.update(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
        out
    }

    fn text_chunk(keyword: &str, text: &str) -> Vec<u8> {
        let mut data = keyword.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(text.as_bytes());
        chunk(b"tEXt", &data)
    }

    fn png_with_text(keyword: &str, text: &str) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        let ihdr = [0, 0, 0, 4, 0, 0, 0, 4, 8, 6, 0, 0, 0];
        out.extend_from_slice(&chunk(b"IHDR", &ihdr));
        out.extend_from_slice(&text_chunk(keyword, text));
        out.extend_from_slice(&chunk(b"IEND", b""));
        out
    }

    /// RGBA PNG whose alpha LSBs (LSB-first bit order) carry `payload`.
    fn png_with_stego(payload: &[u8]) -> Vec<u8> {
        let (width, height) = (64usize, 8usize);
        let mut pixels = vec![0xFFu8; width * height * 4];
        for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
            let (byte, bit) = (i / 8, i % 8);
            let value = payload.get(byte).copied().unwrap_or(0);
            px[3] = 0xFE | ((value >> bit) & 1);
        }
        let filtered = imprint_stego::unfilter::filter(&pixels, width, height, 4, 0);
        let idat = imprint_inflate::deflate(&filtered).unwrap();
        let mut out = PNG_SIGNATURE.to_vec();
        let ihdr = [0, 0, 0, 64, 0, 0, 0, 8, 8, 6, 0, 0, 0];
        out.extend_from_slice(&chunk(b"IHDR", &ihdr));
        out.extend_from_slice(&chunk(b"IDAT", &idat));
        out.extend_from_slice(&chunk(b"IEND", b""));
        out
    }

    fn jpeg_with_description(text: &str) -> Vec<u8> {
        let mut tiff = vec![0x49, 0x49, 0x2A, 0x00, 8, 0, 0, 0];
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x010Eu16.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&(text.len() as u32 + 1).to_le_bytes());
        tiff.extend_from_slice(&26u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(text.as_bytes());
        tiff.push(0);
        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&tiff);
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    /// JPEG whose only metadata is a whitespace IPTC caption.
    fn jpeg_with_blank_caption() -> Vec<u8> {
        let mut iptc = vec![0x1C, 2, 120];
        iptc.extend_from_slice(&3u16.to_be_bytes());
        iptc.extend_from_slice(b"   ");
        let mut block = b"8BIM".to_vec();
        block.extend_from_slice(&0x0404u16.to_be_bytes());
        block.extend_from_slice(&[0, 0]);
        block.extend_from_slice(&(iptc.len() as u32).to_be_bytes());
        block.extend_from_slice(&iptc);
        let mut payload = b"Photoshop 3.0\0".to_vec();
        payload.extend_from_slice(&block);
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xED];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    async fn engine() -> Engine {
        Engine::new(Config::default(), imprint_cache::PromptCache::ephemeral().await.unwrap())
    }

    fn handle(mock: &Arc<MockSource>) -> SourceHandle {
        Arc::clone(mock) as SourceHandle
    }

    #[tokio::test]
    async fn test_png_parameters_chunk() {
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "foo")));
        assert_eq!(engine.extract("a.png", handle(&mock)).await.as_deref(), Some("foo"));
    }

    #[tokio::test]
    async fn test_unicode_marker_is_no_result() {
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "UNICODE")));
        assert_eq!(engine.extract("a.png", handle(&mock)).await, None);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_second_call() {
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "cached prompt")));
        assert!(engine.extract("same.png", handle(&mock)).await.is_some());
        let after_first = mock.range_calls();
        assert!(engine.extract("same.png", handle(&mock)).await.is_some());
        assert_eq!(mock.range_calls(), after_first, "second call must not fetch");
    }

    #[tokio::test]
    async fn test_feature_gate_means_zero_io() {
        let config = Config { enabled: false, ..Config::default() };
        let engine =
            Engine::new(config, imprint_cache::PromptCache::ephemeral().await.unwrap());
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "x")));
        assert_eq!(engine.extract("a.png", handle(&mock)).await, None);
        assert_eq!(mock.range_calls() + mock.head_calls(), 0);
    }

    #[tokio::test]
    async fn test_screenshot_and_video_are_skipped_without_io() {
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "x")));
        assert_eq!(engine.extract("shots/Screenshot_1.png", handle(&mock)).await, None);
        assert_eq!(engine.extract("clip.mp4", handle(&mock)).await, None);
        assert_eq!(mock.range_calls() + mock.head_calls(), 0);
    }

    #[tokio::test]
    async fn test_sniff_overrides_extension_hint() {
        // A PNG mislabelled as .jpg still goes down the PNG path.
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "mislabelled")));
        assert_eq!(engine.extract("a.jpg", handle(&mock)).await.as_deref(), Some("mislabelled"));
    }

    #[tokio::test]
    async fn test_jpeg_exif_description() {
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(jpeg_with_description("sea at dawn")));
        assert_eq!(engine.extract("a.jpg", handle(&mock)).await.as_deref(), Some("sea at dawn"));
    }

    #[tokio::test]
    async fn test_stego_fallback_when_no_text_chunks() {
        let engine = engine().await;
        let payload = br#"{"software":"NovelAI","prompt":"hello"}"#;
        let mock = Arc::new(MockSource::new(png_with_stego(payload)));
        let found = engine.extract("stego.png", handle(&mock)).await.unwrap();
        assert!(found.contains("hello"));
    }

    #[tokio::test]
    async fn test_length_probe_respects_the_gate() {
        let config = Config {
            concurrency: 1,
            timeout_ms: 250,
            sniff_timeout_ms: 50,
            ..Config::default()
        };
        let engine = Engine::new(config, imprint_cache::PromptCache::ephemeral().await.unwrap());
        // Hold the only permit; neither the probe nor any fetch may reach
        // the source while it is out.
        let _held = engine.gate.acquire().await.unwrap();
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "x")));
        assert_eq!(engine.extract("a.png", handle(&mock)).await, None);
        assert_eq!(mock.head_calls(), 0, "length probe must wait for a permit");
        assert_eq!(mock.range_calls(), 0);
    }

    #[tokio::test]
    async fn test_raw_scan_runs_when_segments_are_blank() {
        let engine = engine().await;
        // The IPTC caption is whitespace, so only the raw window scan can
        // surface the trailing JSON.
        let mut bytes = jpeg_with_blank_caption();
        bytes.extend_from_slice(br#"{"prompt": "raw fallback"}"#);
        let mock = Arc::new(MockSource::new(bytes));
        let found = engine.extract("b.jpg", handle(&mock)).await.unwrap();
        assert!(found.contains("raw fallback"));
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_none() {
        let engine = engine().await;
        let mock = Arc::new(MockSource::new(png_with_text("parameters", "x")));
        mock.fail_from_now_on();
        assert_eq!(engine.extract("a.png", handle(&mock)).await, None);
    }

    #[tokio::test]
    async fn test_json_comment_chunk_is_resolved() {
        let engine = engine().await;
        let png = png_with_text("Comment", r#"{"prompt": "night market", "steps": 20}"#);
        let mock = Arc::new(MockSource::new(png));
        let found = engine.extract("c.png", handle(&mock)).await.unwrap();
        assert!(found.starts_with("night market"));
    }
}
