//! Local-file byte source.

use crate::error::{Error, ErrorKind, Result};
use crate::{ByteSource, MAX_RANGE_BYTES};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// Byte source over a local file.
///
/// Serves both local-file locators and the disk-image-cache shortcut, where
/// a rendering cache already holds the raw bytes for a remote URL. Each call
/// opens the file fresh; the source itself holds no file handle, so it is
/// cheap to share and safe to use concurrently.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    /// Create a source over `path`. The file is not opened until first read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "file".to_string());
        Self { name, path }
    }

    /// Path this source reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<File> {
        match File::open(&self.path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::NotFound(self.path.clone()))
            },
            Err(e) => exn::bail!(ErrorKind::Io(e)),
        }
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "trace", skip(self), fields(source = self.name))]
    async fn head_length(&self) -> Result<Option<u64>> {
        let file = self.open().await?;
        let meta = file.metadata().await.map_err(|e| Error::from(ErrorKind::Io(e)))?;
        Ok(Some(meta.len()))
    }

    #[instrument(level = "trace", skip(self), fields(source = self.name, read))]
    async fn fetch_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let length = length.min(MAX_RANGE_BYTES);
        let mut file = self.open().await?;
        let total = file.metadata().await.map(|m| m.len()).unwrap_or(u64::MAX);
        if offset >= total {
            // Reading entirely past the end is "nothing more", not a failure.
            return Ok(Vec::new());
        }
        file.seek(SeekFrom::Start(offset)).await.map_err(|e| Error::from(ErrorKind::Io(e)))?;
        let want = usize::try_from(length.min(total - offset)).unwrap_or(usize::MAX);
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await.map_err(|e| Error::from(ErrorKind::Io(e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        tracing::Span::current().record("read", filled);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(contents: &[u8]) -> (tempfile::TempDir, FileSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::File::create(&path).unwrap().write_all(contents).unwrap();
        (dir, FileSource::new(path))
    }

    #[tokio::test]
    async fn test_head_length() {
        let (_dir, source) = fixture(b"0123456789");
        assert_eq!(source.head_length().await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_fetch_range_middle() {
        let (_dir, source) = fixture(b"0123456789");
        assert_eq!(source.fetch_range(2, 4).await.unwrap(), b"2345");
    }

    #[tokio::test]
    async fn test_fetch_range_truncates_at_eof() {
        let (_dir, source) = fixture(b"0123456789");
        assert_eq!(source.fetch_range(8, 100).await.unwrap(), b"89");
    }

    #[tokio::test]
    async fn test_fetch_range_past_eof_is_empty() {
        let (_dir, source) = fixture(b"0123456789");
        assert!(source.fetch_range(10, 4).await.unwrap().is_empty());
        assert!(source.fetch_range(500, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = FileSource::new("/nonexistent/image.png");
        let err = source.fetch_range(0, 16).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }
}
