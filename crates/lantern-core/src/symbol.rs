//! Symbol neighbour derivation.
//!
//! A coded symbol's payload is the XOR of the intermediate blocks at the
//! indices this module derives. Both ends compute the set from
//! `(session_id, symbol_id, block_count)` alone, so no per-symbol state ever
//! crosses the channel.
//!
//! Ids 1..=K' are systematic: symbol `id` carries intermediate block
//! `id - 1` verbatim, so one clean pass over the systematic range is a
//! complete transmission. Ids above K' are fountain symbols: degree 1 with
//! probability [`DEGREE_ONE_FRACTION`], otherwise [`MAX_FOUNTAIN_DEGREE`]
//! distinct random neighbours.

use crate::prng::XorShift128;

/// Fraction of fountain symbols that carry a single random block.
///
/// Protocol constant: changing it desynchronises neighbour derivation
/// between sender and receiver.
pub const DEGREE_ONE_FRACTION: f64 = 0.15;

/// XOR degree of the remaining fountain symbols.
///
/// Protocol constant, same caveat as [`DEGREE_ONE_FRACTION`].
pub const MAX_FOUNTAIN_DEGREE: u32 = 3;

/// Derive the intermediate-block indices mixed into symbol `symbol_id`.
///
/// `symbol_id` 0 is the metadata symbol and has no neighbours; callers
/// handle it before deriving. `block_count` is the intermediate-block
/// count K' and must be non-zero.
#[must_use]
pub fn neighbours(session_id: u32, symbol_id: u32, block_count: u32) -> Vec<u32> {
    debug_assert!(symbol_id != 0, "metadata symbol has no neighbours");
    debug_assert!(block_count > 0);

    // Seeded even on the systematic path so both ends stay uniform.
    let mut rng = XorShift128::new(session_id ^ symbol_id);

    if symbol_id <= block_count {
        return vec![(symbol_id - 1) % block_count];
    }

    let p = f64::from(rng.next_u32()) / 4_294_967_296.0;
    if p < DEGREE_ONE_FRACTION {
        return vec![rng.next_bounded(block_count)];
    }

    let degree = MAX_FOUNTAIN_DEGREE.min(block_count - 1);
    if degree == 0 {
        // K' = 1 leaves no room for a multi-block mix.
        return vec![rng.next_bounded(block_count)];
    }
    rng.pick_unique(degree as usize, block_count)
}
