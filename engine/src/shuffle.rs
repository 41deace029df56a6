//! Deterministic deck shuffling.
//!
//! The room code is the only seed: every client regenerates the identical
//! permutation locally, so the card-to-identifier mapping never crosses the
//! wire. The code is hashed to 32 bytes and drives a ChaCha stream through a
//! Fisher-Yates pass.

use pyramid_types::{RoomCode, DECK_SIZE};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Expand the room code into a 32-byte PRNG seed.
fn seed_bytes(room: &RoomCode) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(room.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    seed
}

/// Produce the full-deck permutation for a room.
///
/// Pure: repeated calls with the same room code return the same ordering,
/// and the result is always a bijection over `0..52`.
pub fn shuffled_deck(room: &RoomCode) -> Vec<u8> {
    let mut rng = ChaCha8Rng::from_seed(seed_bytes(room));
    let mut deck: Vec<u8> = (0..DECK_SIZE as u8).collect();
    for i in (1..deck.len()).rev() {
        let j = rng.gen_range(0..=i);
        deck.swap(i, j);
    }
    deck
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str) -> RoomCode {
        RoomCode::parse(code).unwrap()
    }

    #[test]
    fn test_shuffle_is_permutation() {
        for code in ["ABCD", "ZZZZ", "GAME", "PYRMD"] {
            let deck = shuffled_deck(&room(code));
            assert_eq!(deck.len(), DECK_SIZE);
            let mut present = [false; DECK_SIZE];
            for &card in &deck {
                assert!(!present[card as usize], "card {card} repeated");
                present[card as usize] = true;
            }
        }
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        assert_eq!(shuffled_deck(&room("ABCD")), shuffled_deck(&room("ABCD")));
        // Case-insensitive: the code normalizes before hashing.
        assert_eq!(shuffled_deck(&room("abcd")), shuffled_deck(&room("ABCD")));
    }

    #[test]
    fn test_distinct_seeds_differ() {
        assert_ne!(shuffled_deck(&room("ABCD")), shuffled_deck(&room("ABCE")));
    }
}
