//! Packet encoding and decoding for the LANTERN wire format.
//!
//! A packet is a 16-byte header followed by exactly `block_size` payload
//! bytes. All multi-byte fields are big-endian (network byte order). Parsing
//! is zero-copy; the payload is a borrowed slice into the capture buffer.
//!
//! The framer is stateless: every packet carries enough context (session id,
//! intermediate-block count, block size) for a receiver to join mid-stream.

use crate::error::PacketError;
use crate::{MAX_BLOCK_COUNT, PACKET_HEADER_SIZE, PROTOCOL_VERSION};

/// Channel-mode hint carried in flag bits 1-2.
///
/// Tells the visual layer how the symbol carrier multiplexes colour channels.
/// The codec stores and forwards the hint verbatim; it never dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChannelHint {
    /// Single-channel (monochrome) symbols
    #[default]
    Mono = 0,
    /// Three data channels over RGB
    Rgb = 1,
    /// Stacked high-density colour symbols
    Stacked = 2,
    /// Reserved for future carriers
    Reserved = 3,
}

impl ChannelHint {
    /// Decode a hint from its two-bit encoding (higher bits are ignored).
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Mono,
            1 => Self::Rgb,
            2 => Self::Stacked,
            _ => Self::Reserved,
        }
    }

    /// The two-bit encoding of this hint.
    #[must_use]
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Packet flags bitmap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// Payload carries the session metadata rather than coded data
    pub const METADATA: u8 = 0b0000_0001;
    /// Mask of the channel-mode hint bits
    pub const HINT_MASK: u8 = 0b0000_0110;

    /// Create new empty flags
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    /// Create flags from a raw byte, preserving reserved bits
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Mark the packet as a metadata packet
    #[must_use]
    pub fn with_metadata(mut self) -> Self {
        self.0 |= Self::METADATA;
        self
    }

    /// Set the channel-mode hint
    #[must_use]
    pub fn with_hint(mut self, hint: ChannelHint) -> Self {
        self.0 = (self.0 & !Self::HINT_MASK) | (hint.bits() << 1);
        self
    }

    /// Check if the metadata bit is set
    #[must_use]
    pub fn is_metadata(&self) -> bool {
        self.0 & Self::METADATA != 0
    }

    /// Extract the channel-mode hint
    #[must_use]
    pub fn hint(&self) -> ChannelHint {
        ChannelHint::from_bits((self.0 & Self::HINT_MASK) >> 1)
    }

    /// Get raw byte value
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

/// Zero-copy packet view into a capture buffer
#[derive(Debug)]
pub struct Packet<'a> {
    session_id: u32,
    block_count: u32,
    symbol_id: u32,
    block_size: u16,
    flags: PacketFlags,
    payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Parse a packet from raw bytes (zero-copy).
    ///
    /// Bytes beyond `header + block_size` are ignored; visual carriers may
    /// pad their symbols.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Truncated`] if the buffer is smaller than the
    /// header or the advertised payload, [`PacketError::InvalidProtocol`] on
    /// a version mismatch, and [`PacketError::BlockCountExceeded`] when the
    /// header advertises more blocks than a decoder will allocate.
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(PacketError::Truncated {
                expected: PACKET_HEADER_SIZE,
                actual: data.len(),
            });
        }

        if data[0] != PROTOCOL_VERSION {
            return Err(PacketError::InvalidProtocol(data[0]));
        }

        let session_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        let block_count = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
        let symbol_id = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
        let block_size = u16::from_be_bytes([data[13], data[14]]);
        let flags = PacketFlags::from_raw(data[15]);

        if block_count > MAX_BLOCK_COUNT {
            return Err(PacketError::BlockCountExceeded(block_count));
        }

        let expected = PACKET_HEADER_SIZE + block_size as usize;
        if data.len() < expected {
            return Err(PacketError::Truncated {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            session_id,
            block_count,
            symbol_id,
            block_size,
            flags,
            payload: &data[PACKET_HEADER_SIZE..expected],
        })
    }

    /// Get the session id
    #[must_use]
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Get the advertised intermediate-block count (K')
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Get the symbol id
    #[must_use]
    pub fn symbol_id(&self) -> u32 {
        self.symbol_id
    }

    /// Get the payload size in bytes
    #[must_use]
    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    /// Get the packet flags
    #[must_use]
    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    /// Get the payload slice (zero-copy)
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Builder for constructing packets
#[derive(Debug, Default)]
pub struct PacketBuilder {
    session_id: u32,
    block_count: u32,
    symbol_id: u32,
    flags: PacketFlags,
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Create a new packet builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session id
    #[must_use]
    pub fn session_id(mut self, id: u32) -> Self {
        self.session_id = id;
        self
    }

    /// Set the advertised intermediate-block count (K')
    #[must_use]
    pub fn block_count(mut self, count: u32) -> Self {
        self.block_count = count;
        self
    }

    /// Set the symbol id
    #[must_use]
    pub fn symbol_id(mut self, id: u32) -> Self {
        self.symbol_id = id;
        self
    }

    /// Set the flags
    #[must_use]
    pub fn flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the payload; its length becomes the advertised block size
    #[must_use]
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    /// Serialise the packet into a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::OversizedPayload`] if the payload does not fit
    /// the 16-bit block-size field.
    pub fn build(self) -> Result<Vec<u8>, PacketError> {
        let block_size = u16::try_from(self.payload.len())
            .map_err(|_| PacketError::OversizedPayload(self.payload.len()))?;

        let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + self.payload.len());
        buf.push(PROTOCOL_VERSION);
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        buf.extend_from_slice(&self.block_count.to_be_bytes());
        buf.extend_from_slice(&self.symbol_id.to_be_bytes());
        buf.extend_from_slice(&block_size.to_be_bytes());
        buf.push(self.flags.as_u8());
        buf.extend_from_slice(&self.payload);

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_roundtrip() {
        let encoded = PacketBuilder::new()
            .session_id(0xA1B2_C3D4)
            .block_count(1234)
            .symbol_id(42)
            .flags(PacketFlags::new().with_hint(ChannelHint::Rgb))
            .payload(&[0x55; 200])
            .build()
            .unwrap();

        assert_eq!(encoded.len(), PACKET_HEADER_SIZE + 200);

        let parsed = Packet::parse(&encoded).unwrap();
        assert_eq!(parsed.session_id(), 0xA1B2_C3D4);
        assert_eq!(parsed.block_count(), 1234);
        assert_eq!(parsed.symbol_id(), 42);
        assert_eq!(parsed.block_size(), 200);
        assert!(!parsed.flags().is_metadata());
        assert_eq!(parsed.flags().hint(), ChannelHint::Rgb);
        assert_eq!(parsed.payload(), &[0x55; 200][..]);
    }

    #[test]
    fn test_packet_too_short() {
        let short = [PROTOCOL_VERSION; 10];
        assert!(matches!(
            Packet::parse(&short),
            Err(PacketError::Truncated {
                expected: PACKET_HEADER_SIZE,
                ..
            })
        ));
    }

    #[test]
    fn test_payload_shorter_than_advertised() {
        let mut encoded = PacketBuilder::new()
            .payload(&[1u8; 64])
            .build()
            .unwrap();
        encoded.truncate(PACKET_HEADER_SIZE + 10);

        assert!(matches!(
            Packet::parse(&encoded),
            Err(PacketError::Truncated { actual: 26, .. })
        ));
    }

    #[test]
    fn test_trailing_carrier_padding_ignored() {
        let mut encoded = PacketBuilder::new()
            .symbol_id(9)
            .payload(&[7u8; 32])
            .build()
            .unwrap();
        encoded.extend_from_slice(&[0xFF; 40]);

        let parsed = Packet::parse(&encoded).unwrap();
        assert_eq!(parsed.payload(), &[7u8; 32][..]);
    }

    #[test]
    fn test_version_mismatch() {
        let mut encoded = PacketBuilder::new().payload(&[0u8; 16]).build().unwrap();
        encoded[0] = 0x02;

        assert!(matches!(
            Packet::parse(&encoded),
            Err(PacketError::InvalidProtocol(0x02))
        ));
    }

    #[test]
    fn test_block_count_limit() {
        let mut encoded = PacketBuilder::new()
            .block_count(crate::MAX_BLOCK_COUNT)
            .payload(&[0u8; 16])
            .build()
            .unwrap();
        assert!(Packet::parse(&encoded).is_ok());

        encoded[5..9].copy_from_slice(&(crate::MAX_BLOCK_COUNT + 1).to_be_bytes());
        assert!(matches!(
            Packet::parse(&encoded),
            Err(PacketError::BlockCountExceeded(_))
        ));
    }

    #[test]
    fn test_metadata_flag() {
        let encoded = PacketBuilder::new()
            .flags(PacketFlags::new().with_metadata().with_hint(ChannelHint::Stacked))
            .payload(&[0u8; 16])
            .build()
            .unwrap();

        let parsed = Packet::parse(&encoded).unwrap();
        assert!(parsed.flags().is_metadata());
        assert_eq!(parsed.flags().hint(), ChannelHint::Stacked);
    }

    #[test]
    fn test_reserved_flag_bits_preserved() {
        let flags = PacketFlags::from_raw(0b1010_0001);
        let encoded = PacketBuilder::new()
            .flags(flags)
            .payload(&[0u8; 16])
            .build()
            .unwrap();

        let parsed = Packet::parse(&encoded).unwrap();
        assert_eq!(parsed.flags().as_u8(), 0b1010_0001);
        assert!(parsed.flags().is_metadata());
    }

    #[test]
    fn test_empty_payload() {
        let encoded = PacketBuilder::new().payload(&[]).build().unwrap();
        let parsed = Packet::parse(&encoded).unwrap();
        assert_eq!(parsed.block_size(), 0);
        assert_eq!(parsed.payload().len(), 0);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = PacketBuilder::new().payload(&vec![0u8; 70_000]).build();
        assert!(matches!(result, Err(PacketError::OversizedPayload(70_000))));
    }

    #[test]
    fn test_hint_bits_roundtrip() {
        for hint in [
            ChannelHint::Mono,
            ChannelHint::Rgb,
            ChannelHint::Stacked,
            ChannelHint::Reserved,
        ] {
            assert_eq!(ChannelHint::from_bits(hint.bits()), hint);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_parse_doesnt_panic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
                let _ = Packet::parse(&data);
            }

            #[test]
            fn prop_roundtrip_preserves_fields(
                session_id in any::<u32>(),
                block_count in 0u32..=crate::MAX_BLOCK_COUNT,
                symbol_id in any::<u32>(),
                flags in any::<u8>(),
                payload in prop::collection::vec(any::<u8>(), 0..1024),
            ) {
                let encoded = PacketBuilder::new()
                    .session_id(session_id)
                    .block_count(block_count)
                    .symbol_id(symbol_id)
                    .flags(PacketFlags::from_raw(flags))
                    .payload(&payload)
                    .build()
                    .unwrap();

                let parsed = Packet::parse(&encoded).unwrap();
                prop_assert_eq!(parsed.session_id(), session_id);
                prop_assert_eq!(parsed.block_count(), block_count);
                prop_assert_eq!(parsed.symbol_id(), symbol_id);
                prop_assert_eq!(parsed.block_size() as usize, payload.len());
                prop_assert_eq!(parsed.flags().as_u8(), flags);
                prop_assert_eq!(parsed.payload(), payload.as_slice());
            }

            #[test]
            fn prop_wrong_version_rejected(version in 0u8..=255) {
                prop_assume!(version != crate::PROTOCOL_VERSION);
                let mut encoded = PacketBuilder::new().payload(&[0u8; 32]).build().unwrap();
                encoded[0] = version;
                prop_assert!(matches!(
                    Packet::parse(&encoded),
                    Err(PacketError::InvalidProtocol(_))
                ));
            }
        }
    }
}
