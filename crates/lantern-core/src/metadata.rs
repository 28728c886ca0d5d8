//! Metadata payload codec.
//!
//! The metadata symbol (id 0) describes the staged file: name, MIME type,
//! exact byte length, SHA-256 digest, source-block count, and the channel
//! mode the sender renders with. It is retransmitted periodically, so a
//! receiver that rejects one copy simply waits for the next.

use crate::error::MetadataError;
use crate::packet::ChannelHint;

/// Longest filename or MIME string carried on the wire, in bytes.
pub const MAX_STRING_LEN: usize = 255;

/// Session metadata serialised into the payload of symbol 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    /// Original filename (UTF-8, at most 255 bytes on the wire)
    pub filename: String,
    /// MIME type (UTF-8, at most 255 bytes on the wire)
    pub mime: String,
    /// Exact file length in bytes
    pub file_size: u32,
    /// SHA-256 digest of the file bytes
    pub digest: [u8; 32],
    /// Source-block count (K)
    pub source_count: u32,
    /// Channel mode the sender renders with
    pub mode: ChannelHint,
}

impl TransferMetadata {
    /// Serialise into the length-prefixed wire layout.
    ///
    /// Strings longer than 255 bytes are truncated on a character boundary
    /// so the payload stays valid UTF-8.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let filename = truncate_utf8(&self.filename, MAX_STRING_LEN);
        let mime = truncate_utf8(&self.mime, MAX_STRING_LEN);

        let mut buf = Vec::with_capacity(2 + filename.len() + mime.len() + 41);
        buf.push(filename.len() as u8);
        buf.extend_from_slice(filename.as_bytes());
        buf.push(mime.len() as u8);
        buf.extend_from_slice(mime.as_bytes());
        buf.extend_from_slice(&self.file_size.to_be_bytes());
        buf.extend_from_slice(&self.digest);
        buf.extend_from_slice(&self.source_count.to_be_bytes());
        buf.push(self.mode.bits());
        buf
    }

    /// Parse a metadata payload.
    ///
    /// The trailing `mode` byte is optional for compatibility with v0
    /// senders and defaults to [`ChannelHint::Mono`]. Zero-padding past the
    /// decoded fields is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Truncated`] when a declared length overruns
    /// the buffer, [`MetadataError::InvalidUtf8`] for malformed strings, and
    /// [`MetadataError::ZeroBlocks`] when the payload declares no source
    /// blocks.
    pub fn parse(data: &[u8]) -> Result<Self, MetadataError> {
        let mut cursor = Cursor::new(data);

        let filename_len = cursor.read_u8("filename length")? as usize;
        let filename = cursor.read_str(filename_len, "filename")?;
        let mime_len = cursor.read_u8("mime length")? as usize;
        let mime = cursor.read_str(mime_len, "mime")?;
        let file_size = cursor.read_u32("file size")?;
        let digest = cursor.read_digest()?;
        let source_count = cursor.read_u32("block count")?;
        let mode = match cursor.read_u8("mode") {
            Ok(bits) => ChannelHint::from_bits(bits),
            Err(_) => ChannelHint::Mono,
        };

        if source_count == 0 {
            return Err(MetadataError::ZeroBlocks);
        }

        Ok(Self {
            filename,
            mime,
            file_size,
            digest,
            source_count,
            mode,
        })
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], MetadataError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(MetadataError::Truncated { field })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, MetadataError> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, MetadataError> {
        let b = self.take(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_str(&mut self, len: usize, field: &'static str) -> Result<String, MetadataError> {
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| MetadataError::InvalidUtf8 { field })
    }

    fn read_digest(&mut self) -> Result<[u8; 32], MetadataError> {
        let bytes = self.take(32, "digest")?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(bytes);
        Ok(digest)
    }
}
