//! Staging local files for streaming.

use std::fs;
use std::io;
use std::path::Path;

use lantern_core::{ChannelHint, EncodeError, Encoder};
use tracing::debug;

use crate::hasher::digest_bytes;

/// A file read into memory and ready to be streamed.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Filename carried in the session metadata
    pub filename: String,
    /// MIME type carried in the session metadata
    pub mime: String,
    /// File contents
    pub bytes: Vec<u8>,
    /// SHA-256 digest of the contents
    pub digest: [u8; 32],
}

impl StagedFile {
    /// Read and hash a file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let mime = mime_for_path(path).to_string();
        let digest = digest_bytes(&bytes);

        debug!(
            filename = %filename,
            size = bytes.len(),
            mime = %mime,
            "staged file"
        );

        Ok(Self {
            filename,
            mime,
            bytes,
            digest,
        })
    }

    /// Stage an in-memory buffer.
    #[must_use]
    pub fn from_bytes(filename: &str, mime: &str, bytes: Vec<u8>) -> Self {
        let digest = digest_bytes(&bytes);
        Self {
            filename: filename.to_string(),
            mime: mime.to_string(),
            bytes,
            digest,
        }
    }

    /// Construct the fountain encoder for this file.
    ///
    /// # Errors
    ///
    /// Propagates [`EncodeError`] from encoder construction, notably
    /// `FileTooLarge` before any streaming begins.
    pub fn encoder(&self, block_size: u16, hint: ChannelHint) -> Result<Encoder, EncodeError> {
        Encoder::new(
            &self.bytes,
            &self.filename,
            &self.mime,
            self.digest,
            block_size,
            hint,
        )
    }

    /// File length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Best-effort MIME lookup from the file extension.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("txt") | Some("log") | Some("md") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
