//! Belief-propagation decoder with parity-aided recovery.
//!
//! The decoder consumes packets in any order, at any loss rate, and with any
//! amount of duplication. Every data symbol becomes an XOR constraint over
//! the intermediate block set; reduction substitutes known blocks into
//! pending constraints and peels the degree-1 remainder, cascading until a
//! fixpoint. Once the metadata symbol has delivered the parity map, any
//! parity row with a single unknown member is solved directly, and each
//! recovered block re-enters reduction.
//!
//! The terminal state depends only on the *set* of packets received:
//! constraints are reduced with commutative XORs and the neighbour sets are
//! derived per symbol, so ordering and duplication cannot change the
//! outcome.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::error::SessionError;
use crate::metadata::TransferMetadata;
use crate::packet::Packet;
use crate::precode::{xor_into, ParityMap};
use crate::symbol::neighbours;
use crate::MAX_BLOCK_COUNT;

/// Outcome of feeding one captured packet to [`Decoder::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receive {
    /// The packet was consumed (it may or may not have advanced decoding)
    Accepted,
    /// A symbol with this id was already consumed; no state changed
    Duplicate,
    /// The packet belongs to a different session; the caller must
    /// [`Decoder::reset`] and feed the packet again
    NewSession,
    /// The packet failed to parse and was dropped
    Rejected,
}

/// Counters accumulated across a receiver's lifetime.
///
/// Survive [`Decoder::reset`] so the host can keep displaying channel
/// quality across session restarts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiveStats {
    /// Packets dropped as unparseable
    pub rejected: u64,
    /// Data symbols suppressed as duplicates
    pub duplicates: u64,
    /// Metadata payloads that failed to parse
    pub metadata_rejected: u64,
    /// Distinct data symbols consumed
    pub data_symbols: u64,
}

/// One pending XOR equation: `payload = ⨁ blocks[indices]`.
struct Constraint {
    indices: Vec<u32>,
    payload: Vec<u8>,
}

/// Wire parameters locked in by the first packets of a session.
///
/// The block size comes from the first data frame: metadata payloads may
/// outgrow B on tiny-block sessions, so their advertised size is not
/// authoritative.
struct Binding {
    session_id: u32,
    block_count: u32,
    block_size: Option<u16>,
}

/// Rateless decoder and session controller for one transfer at a time.
pub struct Decoder {
    binding: Option<Binding>,
    source_count: Option<u32>,
    parity_map: Option<ParityMap>,
    metadata: Option<TransferMetadata>,
    blocks: Vec<Option<Vec<u8>>>,
    solved_source: u32,
    solved_total: u32,
    seen: HashSet<u32>,
    pending: Vec<Constraint>,
    stats: ReceiveStats,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create an empty decoder; the first parsed packet binds the session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binding: None,
            source_count: None,
            parity_map: None,
            metadata: None,
            blocks: Vec::new(),
            solved_source: 0,
            solved_total: 0,
            seen: HashSet::new(),
            pending: Vec::new(),
            stats: ReceiveStats::default(),
        }
    }

    /// Consume one captured packet.
    ///
    /// Parse and integrity failures are absorbed and counted; the only
    /// outcome requiring caller action is [`Receive::NewSession`].
    pub fn receive(&mut self, data: &[u8]) -> Receive {
        let packet = match Packet::parse(data) {
            Ok(packet) => packet,
            Err(err) => {
                self.stats.rejected += 1;
                trace!(%err, "dropping unparseable packet");
                return Receive::Rejected;
            }
        };

        match &self.binding {
            Some(binding) if binding.session_id != packet.session_id() => {
                debug!(
                    bound = binding.session_id,
                    incoming = packet.session_id(),
                    "packet from a foreign session"
                );
                return Receive::NewSession;
            }
            Some(_) => {}
            None => self.bind(&packet),
        }

        if packet.flags().is_metadata() {
            return self.receive_metadata(&packet);
        }

        let (session_id, block_count) = match self.binding.as_mut() {
            Some(binding) => {
                match binding.block_size {
                    None => binding.block_size = Some(packet.block_size()),
                    // Constraints XOR against B-byte blocks; a frame with a
                    // different size cannot participate.
                    Some(size) if size != packet.block_size() => {
                        self.stats.rejected += 1;
                        return Receive::Rejected;
                    }
                    Some(_) => {}
                }
                (binding.session_id, binding.block_count)
            }
            None => return Receive::Rejected,
        };
        if block_count == 0 {
            // A header advertising an empty block set carries nothing.
            self.stats.rejected += 1;
            return Receive::Rejected;
        }

        if !self.seen.insert(packet.symbol_id()) {
            self.stats.duplicates += 1;
            return Receive::Duplicate;
        }
        self.stats.data_symbols += 1;

        let indices = neighbours(session_id, packet.symbol_id(), block_count);
        self.pending.push(Constraint {
            indices,
            payload: packet.payload().to_vec(),
        });

        self.run_solver();
        Receive::Accepted
    }

    /// Lock the session parameters from the first parsed packet.
    fn bind(&mut self, packet: &Packet<'_>) {
        debug!(
            session_id = packet.session_id(),
            block_count = packet.block_count(),
            block_size = packet.block_size(),
            "binding to session"
        );
        self.blocks = vec![None; packet.block_count() as usize];
        self.binding = Some(Binding {
            session_id: packet.session_id(),
            block_count: packet.block_count(),
            block_size: (!packet.flags().is_metadata()).then(|| packet.block_size()),
        });
    }

    /// Handle a metadata packet for the bound session.
    ///
    /// Retransmissions after a successful parse are no-ops. A payload that
    /// fails to parse is dropped silently; the sender retransmits metadata
    /// periodically, so the decoder just waits for the next copy.
    fn receive_metadata(&mut self, packet: &Packet<'_>) -> Receive {
        if self.metadata.is_some() {
            return Receive::Accepted;
        }

        let meta = match TransferMetadata::parse(packet.payload()) {
            Ok(meta) => meta,
            Err(err) => {
                self.stats.metadata_rejected += 1;
                trace!(%err, "rejecting metadata payload");
                return Receive::Accepted;
            }
        };

        let map = ParityMap::build(meta.source_count);
        let canonical = u64::from(meta.source_count) + u64::from(map.parity_count());
        if canonical > u64::from(MAX_BLOCK_COUNT) {
            self.stats.metadata_rejected += 1;
            return Receive::Accepted;
        }
        let canonical = canonical as u32;

        if let Some(binding) = self.binding.as_mut() {
            if binding.block_count != canonical {
                // The map derived from K is authoritative over the
                // advertised count. Decoded entries keep their indices.
                debug!(
                    advertised = binding.block_count,
                    canonical, "resizing block store to the canonical count"
                );
                self.blocks.resize(canonical as usize, None);
                binding.block_count = canonical;
            }
        }

        debug!(
            filename = %meta.filename,
            file_size = meta.file_size,
            source_count = meta.source_count,
            "session metadata accepted"
        );

        self.seen.insert(packet.symbol_id());
        self.source_count = Some(meta.source_count);
        self.parity_map = Some(map);
        self.metadata = Some(meta);
        self.recount();
        self.run_solver();
        Receive::Accepted
    }

    /// Recompute the solved counters after the source/parity split moved.
    fn recount(&mut self) {
        let k = self.source_count.unwrap_or(0) as usize;
        self.solved_total = self.blocks.iter().filter(|b| b.is_some()).count() as u32;
        self.solved_source = self.blocks[..k.min(self.blocks.len())]
            .iter()
            .filter(|b| b.is_some())
            .count() as u32;
    }

    /// Record a decoded block. Slots are write-once.
    fn assign(&mut self, index: usize, payload: Vec<u8>) {
        debug_assert!(self.blocks[index].is_none(), "block {index} rewritten");
        self.blocks[index] = Some(payload);
        self.solved_total += 1;
        if let Some(k) = self.source_count {
            if (index as u32) < k {
                self.solved_source += 1;
            }
        }
        trace!(index, "decoded intermediate block");
    }

    /// Alternate reduction and parity recovery until neither progresses.
    fn run_solver(&mut self) {
        self.reduce_pending();
        while self.recover_parity() {
            self.reduce_pending();
        }
    }

    /// Reduce pending constraints against known blocks to a fixpoint.
    ///
    /// Each pass substitutes known blocks (shrinking constraints in place),
    /// discards fully-redundant constraints, and peels any that are left
    /// with a single unknown. A peel makes a new block known, so passes
    /// repeat until one completes without a peel.
    fn reduce_pending(&mut self) {
        loop {
            let mut peeled = false;
            let mut i = 0;
            while i < self.pending.len() {
                // A constraint minted against a larger advertised block set
                // can reference slots past the canonical count; it carries
                // no usable information.
                if self.pending[i]
                    .indices
                    .iter()
                    .any(|&idx| idx as usize >= self.blocks.len())
                {
                    self.pending.swap_remove(i);
                    continue;
                }

                let constraint = &mut self.pending[i];
                let mut j = 0;
                while j < constraint.indices.len() {
                    let idx = constraint.indices[j] as usize;
                    if let Some(block) = &self.blocks[idx] {
                        xor_into(&mut constraint.payload, block);
                        constraint.indices.swap_remove(j);
                    } else {
                        j += 1;
                    }
                }

                match constraint.indices.len() {
                    0 => {
                        self.pending.swap_remove(i);
                    }
                    1 => {
                        let constraint = self.pending.swap_remove(i);
                        self.assign(constraint.indices[0] as usize, constraint.payload);
                        peeled = true;
                    }
                    _ => i += 1,
                }
            }
            if !peeled {
                break;
            }
        }
    }

    /// Solve parity rows with exactly one unknown member.
    ///
    /// Returns whether any block was recovered; the caller re-enters
    /// reduction in that case since the new blocks may unlock pending
    /// constraints.
    fn recover_parity(&mut self) -> bool {
        let Some(k) = self.source_count else {
            return false;
        };
        let Some(map) = self.parity_map.take() else {
            return false;
        };

        let mut recovered_any = false;
        loop {
            let mut recovered = false;
            for (p, group) in map.groups().enumerate() {
                let parity_index = k as usize + p;
                if parity_index >= self.blocks.len() {
                    break;
                }
                if self.blocks[parity_index].is_none() {
                    continue;
                }

                let mut unknown = None;
                let mut ambiguous = false;
                for &i in group {
                    if self.blocks[i as usize].is_none() {
                        if unknown.is_some() {
                            ambiguous = true;
                            break;
                        }
                        unknown = Some(i as usize);
                    }
                }
                if ambiguous {
                    continue;
                }
                let Some(target) = unknown else {
                    continue;
                };

                let mut payload = match &self.blocks[parity_index] {
                    Some(parity) => parity.clone(),
                    None => continue,
                };
                for &i in group {
                    let idx = i as usize;
                    if idx == target {
                        continue;
                    }
                    if let Some(block) = &self.blocks[idx] {
                        xor_into(&mut payload, block);
                    }
                }
                self.assign(target, payload);
                recovered = true;
            }
            if !recovered {
                break;
            }
            recovered_any = true;
        }

        self.parity_map = Some(map);
        recovered_any
    }

    /// True once every source block is decoded.
    ///
    /// Parity slots are a means to that end and do not gate completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self.source_count {
            Some(k) => self.solved_source == k,
            None => false,
        }
    }

    /// Fraction of source blocks decoded, 0.0 until metadata arrives.
    #[must_use]
    pub fn progress(&self) -> f64 {
        match self.source_count {
            Some(k) if k > 0 => f64::from(self.solved_source) / f64::from(k),
            _ => 0.0,
        }
    }

    /// Concatenate the decoded source blocks and trim the padding.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoMetadata`] before the metadata symbol is
    /// accepted and [`SessionError::Incomplete`] while source blocks are
    /// still missing.
    pub fn reconstruct(&self) -> Result<Vec<u8>, SessionError> {
        let meta = self.metadata.as_ref().ok_or(SessionError::NoMetadata)?;
        let k = meta.source_count;
        if self.solved_source != k {
            return Err(SessionError::Incomplete {
                solved: self.solved_source,
                required: k,
            });
        }

        let mut out = Vec::with_capacity(meta.file_size as usize);
        for block in self.blocks.iter().take(k as usize) {
            match block {
                Some(bytes) => out.extend_from_slice(bytes),
                None => {
                    return Err(SessionError::Incomplete {
                        solved: self.solved_source,
                        required: k,
                    })
                }
            }
        }
        out.truncate(meta.file_size as usize);
        Ok(out)
    }

    /// Check the reconstruction against the advertised SHA-256 digest.
    ///
    /// False while the session is incomplete.
    #[must_use]
    pub fn verify(&self) -> bool {
        let Some(meta) = &self.metadata else {
            return false;
        };
        match self.reconstruct() {
            Ok(bytes) => {
                let digest: [u8; 32] = Sha256::digest(&bytes).into();
                digest == meta.digest
            }
            Err(_) => false,
        }
    }

    /// Reconstruct and verify in one step.
    ///
    /// # Errors
    ///
    /// As [`Decoder::reconstruct`], plus [`SessionError::VerifyMismatch`]
    /// when the digest does not match; the session is unusable then and the
    /// host should reset and wait for a fresh stream.
    pub fn verified_reconstruct(&self) -> Result<Vec<u8>, SessionError> {
        let bytes = self.reconstruct()?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        let expected = self
            .metadata
            .as_ref()
            .map(|meta| meta.digest)
            .ok_or(SessionError::NoMetadata)?;
        if digest != expected {
            return Err(SessionError::VerifyMismatch);
        }
        Ok(bytes)
    }

    /// Clear all session state, keeping the lifetime counters.
    pub fn reset(&mut self) {
        debug!("resetting decoder state");
        let stats = self.stats;
        *self = Self::new();
        self.stats = stats;
    }

    /// Session id, once bound.
    #[must_use]
    pub fn session_id(&self) -> Option<u32> {
        self.binding.as_ref().map(|b| b.session_id)
    }

    /// Intermediate-block count, once bound.
    #[must_use]
    pub fn block_count(&self) -> Option<u32> {
        self.binding.as_ref().map(|b| b.block_count)
    }

    /// Block size advertised by the session's data frames, once one arrives.
    #[must_use]
    pub fn block_size(&self) -> Option<u16> {
        self.binding.as_ref().and_then(|b| b.block_size)
    }

    /// Source-block count, once metadata arrives.
    #[must_use]
    pub fn source_count(&self) -> Option<u32> {
        self.source_count
    }

    /// Session metadata, once accepted.
    #[must_use]
    pub fn metadata(&self) -> Option<&TransferMetadata> {
        self.metadata.as_ref()
    }

    /// Number of distinct symbols consumed this session.
    #[must_use]
    pub fn unique_symbol_count(&self) -> usize {
        self.seen.len()
    }

    /// Constraints still waiting on unknown blocks.
    #[must_use]
    pub fn pending_constraints(&self) -> usize {
        self.pending.len()
    }

    /// Lifetime receive counters.
    #[must_use]
    pub fn stats(&self) -> ReceiveStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::packet::ChannelHint;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((7 * i + 13) % 256) as u8).collect()
    }

    fn digest_of(bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }

    fn encoder(session_id: u32, bytes: &[u8]) -> Encoder {
        Encoder::with_session_id(
            session_id,
            bytes,
            "roundtrip.bin",
            "application/octet-stream",
            digest_of(bytes),
            200,
            ChannelHint::Mono,
        )
        .unwrap()
    }

    #[test]
    fn test_garbage_is_rejected_and_counted() {
        let mut dec = Decoder::new();
        assert_eq!(dec.receive(&[]), Receive::Rejected);
        assert_eq!(dec.receive(&[0xFF; 40]), Receive::Rejected);
        assert_eq!(dec.stats().rejected, 2);
        assert!(dec.session_id().is_none());
    }

    #[test]
    fn test_first_packet_binds_session() {
        let enc = encoder(77, &pattern(450));
        let mut dec = Decoder::new();
        assert_eq!(dec.receive(&enc.emit(3)), Receive::Accepted);
        assert_eq!(dec.session_id(), Some(77));
        assert_eq!(dec.block_count(), Some(7));
        assert_eq!(dec.block_size(), Some(200));
        assert!(!dec.is_complete());
        assert_eq!(dec.progress(), 0.0);
    }

    #[test]
    fn test_duplicates_are_suppressed() {
        let enc = encoder(5, &pattern(450));
        let mut dec = Decoder::new();
        let packet = enc.emit(7);

        assert_eq!(dec.receive(&packet), Receive::Accepted);
        for _ in 0..999 {
            assert_eq!(dec.receive(&packet), Receive::Duplicate);
        }
        assert_eq!(dec.unique_symbol_count(), 1);
        assert_eq!(dec.stats().duplicates, 999);
        assert!(dec.pending_constraints() <= 1);
    }

    #[test]
    fn test_foreign_session_reported_and_refeed_works() {
        let data = pattern(450);
        let enc_a = encoder(1, &data);
        let enc_b = encoder(2, &data);
        let mut dec = Decoder::new();

        for id in 1..=5 {
            assert_eq!(dec.receive(&enc_a.emit(id)), Receive::Accepted);
        }
        let foreign = enc_b.emit(1);
        assert_eq!(dec.receive(&foreign), Receive::NewSession);
        // State untouched until the caller resets.
        assert_eq!(dec.session_id(), Some(1));

        dec.reset();
        assert_eq!(dec.receive(&foreign), Receive::Accepted);
        assert_eq!(dec.session_id(), Some(2));
        assert_eq!(dec.unique_symbol_count(), 1);
    }

    #[test]
    fn test_stats_survive_reset() {
        let enc = encoder(9, &pattern(450));
        let mut dec = Decoder::new();
        let packet = enc.emit(1);
        dec.receive(&packet);
        dec.receive(&packet);
        dec.reset();
        assert_eq!(dec.stats().duplicates, 1);
        assert_eq!(dec.unique_symbol_count(), 0);
    }

    #[test]
    fn test_metadata_retransmission_is_accepted_noop() {
        let enc = encoder(3, &pattern(450));
        let mut dec = Decoder::new();
        assert_eq!(dec.receive(&enc.emit(0)), Receive::Accepted);
        assert_eq!(dec.receive(&enc.emit(0)), Receive::Accepted);
        assert!(dec.metadata().is_some());
        assert_eq!(dec.source_count(), Some(3));
    }

    #[test]
    fn test_corrupt_metadata_waits_for_retransmission() {
        let enc = encoder(4, &pattern(450));
        let mut dec = Decoder::new();

        let mut corrupt = enc.emit(0);
        // Overrun the declared filename length.
        corrupt[crate::PACKET_HEADER_SIZE] = 255;
        assert_eq!(dec.receive(&corrupt), Receive::Accepted);
        assert!(dec.metadata().is_none());
        assert_eq!(dec.stats().metadata_rejected, 1);

        assert_eq!(dec.receive(&enc.emit(0)), Receive::Accepted);
        assert!(dec.metadata().is_some());
    }

    #[test]
    fn test_metadata_recounts_previously_decoded_blocks() {
        let enc = encoder(6, &pattern(450));
        let mut dec = Decoder::new();

        // Source blocks land before the decoder knows the split.
        for id in 1..=3 {
            dec.receive(&enc.emit(id));
        }
        assert_eq!(dec.progress(), 0.0);

        dec.receive(&enc.emit(0));
        assert_eq!(dec.source_count(), Some(3));
        assert!(dec.is_complete());
        assert_eq!(dec.progress(), 1.0);
        assert!(dec.verify());
    }

    #[test]
    fn test_reconstruct_before_metadata_fails() {
        let enc = encoder(8, &pattern(450));
        let mut dec = Decoder::new();
        dec.receive(&enc.emit(1));
        assert_eq!(dec.reconstruct(), Err(SessionError::NoMetadata));
        assert!(!dec.verify());
    }

    #[test]
    fn test_incomplete_reconstruct_fails() {
        let enc = encoder(8, &pattern(450));
        let mut dec = Decoder::new();
        dec.receive(&enc.emit(0));
        dec.receive(&enc.emit(1));
        assert!(matches!(
            dec.reconstruct(),
            Err(SessionError::Incomplete {
                solved: 1,
                required: 3
            })
        ));
    }

    #[test]
    fn test_verify_mismatch_surfaces() {
        let data = pattern(450);
        let enc = Encoder::with_session_id(
            11,
            &data,
            "f.bin",
            "application/octet-stream",
            [0xEE; 32], // wrong digest
            200,
            ChannelHint::Mono,
        )
        .unwrap();
        let mut dec = Decoder::new();
        dec.receive(&enc.emit(0));
        for id in 1..=3 {
            dec.receive(&enc.emit(id));
        }
        assert!(dec.is_complete());
        assert!(!dec.verify());
        assert_eq!(
            dec.verified_reconstruct(),
            Err(SessionError::VerifyMismatch)
        );
    }

    #[test]
    fn test_completed_session_is_stable_under_more_packets() {
        let data = pattern(450);
        let enc = encoder(12, &data);
        let mut dec = Decoder::new();
        dec.receive(&enc.emit(0));
        for id in 1..=enc.block_count() {
            dec.receive(&enc.emit(id));
        }
        assert!(dec.is_complete());
        let reconstructed = dec.reconstruct().unwrap();

        // Late fountain symbols reduce to redundant constraints; decoded
        // blocks are write-once and the output cannot change.
        for id in enc.block_count() + 1..enc.block_count() + 40 {
            assert_eq!(dec.receive(&enc.emit(id)), Receive::Accepted);
        }
        assert_eq!(dec.reconstruct().unwrap(), reconstructed);
        assert_eq!(reconstructed, data);
        assert_eq!(dec.pending_constraints(), 0);
    }
}
