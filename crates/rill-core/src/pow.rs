//! Proof-of-work: target derivation, preimage assembly, nonce search.
//!
//! Difficulty is a fixed parameter (bits of required leading zero), not a
//! rolling retarget window — this protocol has no difficulty adjustment.

use crate::hash::{sha256, Hash256};

/// Default difficulty used by [`crate::genesis`] and the test suite:
/// chosen for fast nonce search in tests while still exercising the search
/// loop (spec recommends 12 for test parity, 16-20 for a visible demo).
pub const DEFAULT_DIFFICULTY: u32 = 12;

/// Upper bound on the nonce search before giving up. Not expected to be
/// hit at [`DEFAULT_DIFFICULTY`]; exists so `run` always terminates.
const MAX_NONCE: u64 = u64::MAX;

/// The 256-bit proof-of-work target for a given difficulty: `1 << (256 -
/// difficulty)`, represented as 32 big-endian bytes so it can be compared
/// lexicographically against a SHA-256 digest.
///
/// # Panics
///
/// Panics if `difficulty` is 0 or greater than 256 — both are degenerate
/// (no required work, or a target wider than a 256-bit hash can express).
pub fn target_bytes(difficulty: u32) -> [u8; 32] {
    assert!(
        (1..=256).contains(&difficulty),
        "difficulty must be in 1..=256, got {difficulty}"
    );
    let shift = 256 - difficulty;
    let byte_index = 31 - (shift / 8) as usize;
    let bit = shift % 8;
    let mut target = [0u8; 32];
    target[byte_index] = 1u8 << bit;
    target
}

/// Unsigned LEB128 varint encoding, used only in the PoW preimage (the
/// canonical transaction/block encoding elsewhere uses fixed-width ints).
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Assemble the PoW preimage for nonce `n`:
/// `prev_hash || transactions_root || varint(timestamp) || varint(difficulty) || varint(n)`.
pub fn preimage(
    prev_hash: &Hash256,
    transactions_root: &Hash256,
    timestamp: i64,
    difficulty: u32,
    nonce: u64,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + 3 * 10);
    buf.extend_from_slice(prev_hash.as_bytes());
    buf.extend_from_slice(transactions_root.as_bytes());
    write_varint(&mut buf, timestamp as u64);
    write_varint(&mut buf, difficulty as u64);
    write_varint(&mut buf, nonce);
    buf
}

/// Result of a successful nonce search: the winning nonce and its hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofOfWork {
    pub nonce: u64,
    pub hash: Hash256,
}

/// `true` if `hash`, read as a big-endian 256-bit integer, is strictly
/// below `target`.
fn below_target(hash: &Hash256, target: &[u8; 32]) -> bool {
    hash.as_be_uint() < *target
}

/// Search for the first nonce whose preimage hash is below the difficulty
/// target. Returns `None` only if the nonce space is exhausted, which is
/// not expected at [`DEFAULT_DIFFICULTY`] or anywhere near it.
pub fn run(
    prev_hash: &Hash256,
    transactions_root: &Hash256,
    timestamp: i64,
    difficulty: u32,
) -> Option<ProofOfWork> {
    let target = target_bytes(difficulty);
    for nonce in 0..=MAX_NONCE {
        let data = preimage(prev_hash, transactions_root, timestamp, difficulty, nonce);
        let hash = Hash256::from_bytes(sha256(&data));
        if below_target(&hash, &target) {
            return Some(ProofOfWork { nonce, hash });
        }
        if nonce == MAX_NONCE {
            break;
        }
    }
    None
}

/// Recompute the preimage hash for a claimed `(nonce, hash)` pair and check
/// it against the target. Does not re-run the search.
pub fn validate(
    prev_hash: &Hash256,
    transactions_root: &Hash256,
    timestamp: i64,
    difficulty: u32,
    nonce: u64,
    claimed_hash: &Hash256,
) -> bool {
    let data = preimage(prev_hash, transactions_root, timestamp, difficulty, nonce);
    let recomputed = Hash256::from_bytes(sha256(&data));
    recomputed == *claimed_hash && below_target(&recomputed, &target_bytes(difficulty))
}
