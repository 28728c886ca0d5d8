//! # LANTERN Core
//!
//! Rateless transport codec for the LANTERN (Lossy Air-gapped No-Return
//! Transfer) protocol: one-way file transfer over a visual channel with no
//! back-channel.
//!
//! This crate provides:
//! - Packet framing (16-byte big-endian header, zero-copy parsing)
//! - A deterministic xorshift128 PRNG shared by both ends
//! - The sparse XOR pre-code (parity map construction)
//! - The fountain encoder (systematic + random-degree coded symbols)
//! - The belief-propagation decoder with parity-aided recovery
//! - Session lifecycle, progress, and digest verification
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Session                                  │
//! │   (one file transfer, identified by a random 32-bit id)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Symbols                                  │
//! │   (metadata symbol 0, systematic 1..K', fountain > K')          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Packets                                  │
//! │   (opaque byte units handed to the visual carrier)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The codec is single-threaded and cooperative: the host drives the sender
//! with one [`Encoder::emit`] per display tick and the receiver with one
//! [`Decoder::receive`] per captured frame. Neither call suspends.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod metadata;
pub mod packet;
pub mod precode;
pub mod prng;
pub mod symbol;

pub use decoder::{Decoder, Receive, ReceiveStats};
pub use encoder::{Encoder, SymbolSchedule, METADATA_INTERVAL};
pub use error::{EncodeError, Error, MetadataError, PacketError, SessionError};
pub use metadata::TransferMetadata;
pub use packet::{ChannelHint, Packet, PacketBuilder, PacketFlags};
pub use precode::ParityMap;
pub use prng::XorShift128;
pub use symbol::neighbours;

/// Protocol version stamped on every packet header.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Fixed packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 16;

/// Smallest payload size a session may advertise.
pub const MIN_BLOCK_SIZE: u16 = 16;

/// Upper bound on the intermediate-block count a decoder will allocate for.
///
/// A header advertising more than this is treated as unparseable; it bounds
/// peak memory against corrupt or hostile input.
pub const MAX_BLOCK_COUNT: u32 = 1 << 22;
