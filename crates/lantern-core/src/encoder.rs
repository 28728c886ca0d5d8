//! Fountain encoder: an unbounded stream of coded symbols for one session.
//!
//! The encoder owns the intermediate block set (source blocks followed by
//! parity blocks) and the pre-serialised metadata payload. `emit` is pure
//! with respect to the symbol id, so the host may drive it from any
//! schedule; [`SymbolSchedule`] provides the standard one.

use rand::Rng;
use tracing::debug;

use crate::error::EncodeError;
use crate::metadata::TransferMetadata;
use crate::packet::{ChannelHint, PacketBuilder, PacketFlags};
use crate::precode::{xor_into, ParityMap};
use crate::symbol::neighbours;
use crate::{MAX_BLOCK_COUNT, MIN_BLOCK_SIZE};

/// Data frames between metadata retransmissions in [`SymbolSchedule`].
pub const METADATA_INTERVAL: u32 = 10;

/// Fountain encoder for a single staged file.
#[derive(Debug)]
pub struct Encoder {
    session_id: u32,
    block_size: u16,
    source_count: u32,
    blocks: Vec<Vec<u8>>,
    metadata: TransferMetadata,
    metadata_payload: Vec<u8>,
}

impl Encoder {
    /// Stage a file under a freshly drawn random session id.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::InvalidBlockSize`] for a block size below the
    /// minimum, [`EncodeError::FileTooLarge`] when the length does not fit
    /// the 32-bit wire field, and [`EncodeError::TooManyBlocks`] when the
    /// intermediate set would exceed the decoder allocation limit.
    pub fn new(
        bytes: &[u8],
        filename: &str,
        mime: &str,
        digest: [u8; 32],
        block_size: u16,
        hint: ChannelHint,
    ) -> Result<Self, EncodeError> {
        let session_id = rand::thread_rng().gen();
        Self::with_session_id(session_id, bytes, filename, mime, digest, block_size, hint)
    }

    /// Stage a file under a caller-chosen session id.
    ///
    /// The symbol stream is fully determined by
    /// `(session_id, bytes, block_size)`, which makes this the constructor
    /// of choice for reproducible runs.
    ///
    /// # Errors
    ///
    /// As [`Encoder::new`].
    pub fn with_session_id(
        session_id: u32,
        bytes: &[u8],
        filename: &str,
        mime: &str,
        digest: [u8; 32],
        block_size: u16,
        hint: ChannelHint,
    ) -> Result<Self, EncodeError> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(EncodeError::InvalidBlockSize(block_size));
        }
        let file_size = u32::try_from(bytes.len()).map_err(|_| EncodeError::FileTooLarge {
            size: bytes.len() as u64,
            max: u64::from(u32::MAX),
        })?;

        let b = usize::from(block_size);
        // An empty file still occupies one (all-zero) source block so every
        // session has a systematic phase.
        let source_count = (bytes.len().div_ceil(b) as u32).max(1);
        let map = ParityMap::build(source_count);
        let block_count = u64::from(source_count) + u64::from(map.parity_count());
        if block_count > u64::from(MAX_BLOCK_COUNT) {
            return Err(EncodeError::TooManyBlocks {
                count: block_count,
                max: MAX_BLOCK_COUNT,
            });
        }

        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(block_count as usize);
        for i in 0..source_count as usize {
            let start = i * b;
            let end = ((i + 1) * b).min(bytes.len());
            let mut block = vec![0u8; b];
            if start < bytes.len() {
                block[..end - start].copy_from_slice(&bytes[start..end]);
            }
            blocks.push(block);
        }
        blocks.extend(map.derive_parity_blocks(&blocks, b));

        let metadata = TransferMetadata {
            filename: filename.to_string(),
            mime: mime.to_string(),
            file_size,
            digest,
            source_count,
            mode: hint,
        };
        // Zero-padded to the block size; with tiny blocks the serialised
        // metadata can exceed B, in which case the metadata packet simply
        // advertises its own payload length. Data frames define B.
        let mut metadata_payload = metadata.encode();
        if metadata_payload.len() < b {
            metadata_payload.resize(b, 0);
        }

        debug!(
            session_id,
            source_count,
            parity_count = map.parity_count(),
            block_size,
            "staged file for streaming"
        );

        Ok(Self {
            session_id,
            block_size,
            source_count,
            blocks,
            metadata,
            metadata_payload,
        })
    }

    /// Produce the packet for `symbol_id`.
    ///
    /// Id 0 is the metadata packet; any other id is the XOR of that
    /// symbol's neighbour blocks. Emission cannot fail and touches no
    /// encoder state, so ids may be replayed in any order.
    #[must_use]
    pub fn emit(&self, symbol_id: u32) -> Vec<u8> {
        let flags = PacketFlags::new().with_hint(self.metadata.mode);

        let (flags, payload) = if symbol_id == 0 {
            (flags.with_metadata(), self.metadata_payload.clone())
        } else {
            let mut payload = vec![0u8; usize::from(self.block_size)];
            for idx in neighbours(self.session_id, symbol_id, self.block_count()) {
                xor_into(&mut payload, &self.blocks[idx as usize]);
            }
            (flags, payload)
        };

        PacketBuilder::new()
            .session_id(self.session_id)
            .block_count(self.block_count())
            .symbol_id(symbol_id)
            .flags(flags)
            .payload(&payload)
            .build()
            .expect("block size fits the 16-bit payload field")
    }

    /// Session id stamped on every packet.
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Source-block count (K).
    #[must_use]
    pub fn source_count(&self) -> u32 {
        self.source_count
    }

    /// Intermediate-block count (K' = K + M).
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Parity-block count (M).
    #[must_use]
    pub fn parity_count(&self) -> u32 {
        self.block_count() - self.source_count
    }

    /// Payload size in bytes (B).
    #[must_use]
    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    /// The session metadata carried by symbol 0.
    #[must_use]
    pub fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }
}

/// The standard sender schedule.
///
/// Yields a metadata frame first, then systematic ids with a metadata frame
/// interleaved every [`METADATA_INTERVAL`] data frames. After passing K' the
/// data counter wraps back to 1, restarting the systematic sweep. Hosts that
/// want fountain ids instead drive [`Encoder::emit`] with their own counter.
#[derive(Debug, Clone)]
pub struct SymbolSchedule {
    block_count: u32,
    next: u32,
    since_metadata: u32,
}

impl SymbolSchedule {
    /// Create a schedule for a session with `block_count` intermediate blocks.
    #[must_use]
    pub fn new(block_count: u32) -> Self {
        Self {
            block_count,
            next: 1,
            // Lead with metadata so a fresh receiver can bind immediately.
            since_metadata: METADATA_INTERVAL,
        }
    }

    /// The symbol id to emit for the next display frame.
    pub fn next_id(&mut self) -> u32 {
        if self.since_metadata >= METADATA_INTERVAL {
            self.since_metadata = 0;
            return 0;
        }
        self.since_metadata += 1;
        let id = self.next;
        self.next = if id >= self.block_count { 1 } else { id + 1 };
        id
    }
}

impl Iterator for SymbolSchedule {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        Some(self.next_id())
    }
}
