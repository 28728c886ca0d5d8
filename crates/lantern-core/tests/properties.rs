//! Property-based tests for the codec invariants.
//!
//! Uses proptest to verify order invariance, duplicate idempotence, and
//! pre-code guarantees across large input spaces.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use lantern_core::{ChannelHint, Decoder, Encoder, ParityMap};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((11 * i + 5) % 256) as u8).collect()
}

fn stage(session_id: u32, bytes: &[u8], block_size: u16) -> Encoder {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    Encoder::with_session_id(
        session_id,
        bytes,
        "prop.bin",
        "application/octet-stream",
        digest,
        block_size,
        ChannelHint::Mono,
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The terminal decoder state depends only on the set of packets
    /// received, never on their order.
    #[test]
    fn decode_result_is_order_invariant(
        session_id in any::<u32>(),
        len in 1usize..1000,
        shuffle_seed in any::<u64>(),
    ) {
        let bytes = pattern(len);
        let enc = stage(session_id, &bytes, 64);
        let k_prime = enc.block_count();

        let mut packets = vec![enc.emit(0)];
        packets.extend((1..=k_prime + k_prime / 2).map(|id| enc.emit(id)));
        // Leave holes so reduction has real work in both runs.
        let kept: Vec<Vec<u8>> = packets
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % 3 != 2)
            .map(|(_, p)| p)
            .collect();

        let mut in_order = Decoder::new();
        for packet in &kept {
            in_order.receive(packet);
        }

        let mut shuffled = kept.clone();
        shuffled.shuffle(&mut StdRng::seed_from_u64(shuffle_seed));
        let mut out_of_order = Decoder::new();
        for packet in &shuffled {
            out_of_order.receive(packet);
        }

        prop_assert_eq!(in_order.is_complete(), out_of_order.is_complete());
        prop_assert_eq!(in_order.unique_symbol_count(), out_of_order.unique_symbol_count());
        prop_assert_eq!(in_order.progress(), out_of_order.progress());
        if in_order.is_complete() {
            prop_assert_eq!(
                in_order.reconstruct().unwrap(),
                out_of_order.reconstruct().unwrap()
            );
        }
    }

    /// Feeding every packet twice terminates in the same state as feeding
    /// each once.
    #[test]
    fn duplicate_feed_is_idempotent(
        session_id in any::<u32>(),
        len in 1usize..600,
    ) {
        let bytes = pattern(len);
        let enc = stage(session_id, &bytes, 32);

        let mut packets = vec![enc.emit(0)];
        packets.extend((1..=enc.block_count()).map(|id| enc.emit(id)));

        let mut once = Decoder::new();
        for packet in &packets {
            once.receive(packet);
        }
        let mut twice = Decoder::new();
        for packet in &packets {
            twice.receive(packet);
            twice.receive(packet);
        }

        prop_assert!(once.is_complete());
        prop_assert!(twice.is_complete());
        prop_assert_eq!(twice.stats().duplicates, u64::from(enc.block_count()));
        prop_assert_eq!(once.reconstruct().unwrap(), twice.reconstruct().unwrap());
        prop_assert_eq!(once.unique_symbol_count(), twice.unique_symbol_count());
    }

    /// Every source index belongs to at least one parity group.
    #[test]
    fn parity_map_covers_every_source_index(k in 1u32..2000) {
        let map = ParityMap::build(k);
        let mut covered = vec![false; k as usize];
        for group in map.groups() {
            for &i in group {
                covered[i as usize] = true;
            }
        }
        prop_assert!(covered.iter().all(|&c| c));
    }

    /// Any single missing source block is restored by parity recovery.
    #[test]
    fn single_missing_source_block_always_recovers(
        k in 1u32..=40,
        missing in any::<prop::sample::Index>(),
    ) {
        let len = (k as usize) * 16 - 3;
        let bytes = pattern(len);
        let enc = stage(0x9A7E, &bytes, 16);
        prop_assert_eq!(enc.source_count(), k);

        let missing_id = missing.index(k as usize) as u32 + 1;
        let mut dec = Decoder::new();
        dec.receive(&enc.emit(0));
        for id in 1..=enc.block_count() {
            if id != missing_id {
                dec.receive(&enc.emit(id));
            }
        }

        prop_assert!(dec.is_complete());
        prop_assert!(dec.verify());
        prop_assert_eq!(dec.reconstruct().unwrap(), bytes);
    }
}
