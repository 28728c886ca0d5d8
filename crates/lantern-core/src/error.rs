//! Error types for the LANTERN core codec.

use thiserror::Error;

/// Top-level codec errors
#[derive(Debug, Error)]
pub enum Error {
    /// Packet framing error
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// Metadata payload error
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Encoder construction error
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Session-level error
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// Packet framing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer too short for the header or the advertised payload
    #[error("packet truncated: expected at least {expected}, got {actual}")]
    Truncated {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Unknown protocol version byte
    #[error("invalid protocol version: 0x{0:02X}")]
    InvalidProtocol(u8),

    /// Header advertises more intermediate blocks than the decoder will hold
    #[error("block count {0} exceeds limit")]
    BlockCountExceeded(u32),

    /// Payload does not fit the 16-bit block-size field
    #[error("payload of {0} bytes exceeds the 16-bit block size")]
    OversizedPayload(usize),
}

/// Metadata payload errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// A declared field length overruns the buffer
    #[error("metadata truncated: {field} overruns the payload")]
    Truncated {
        /// Field whose declared length overran
        field: &'static str,
    },

    /// A string field is not valid UTF-8
    #[error("metadata field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Offending field
        field: &'static str,
    },

    /// Metadata declares zero source blocks
    #[error("metadata declares zero source blocks")]
    ZeroBlocks,
}

/// Encoder construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// File size does not fit the 32-bit wire field
    #[error("file of {size} bytes exceeds the {max}-byte transfer limit")]
    FileTooLarge {
        /// Staged file size
        size: u64,
        /// Largest representable size
        max: u64,
    },

    /// Block size outside the supported range
    #[error("block size {0} outside supported range")]
    InvalidBlockSize(u16),

    /// The intermediate block count exceeds what a decoder will accept
    #[error("{count} intermediate blocks exceed the limit of {max}")]
    TooManyBlocks {
        /// Source + parity block count
        count: u64,
        /// Decoder-side allocation limit
        max: u32,
    },
}

/// Session controller errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Reconstruction requested before all source blocks are decoded
    #[error("session incomplete: {solved}/{required} source blocks decoded")]
    Incomplete {
        /// Source blocks decoded so far
        solved: u32,
        /// Source blocks required
        required: u32,
    },

    /// Reconstruction requested before the metadata symbol arrived
    #[error("no metadata received yet")]
    NoMetadata,

    /// Reconstructed bytes do not hash to the advertised digest
    #[error("digest mismatch after reconstruction")]
    VerifyMismatch,
}
