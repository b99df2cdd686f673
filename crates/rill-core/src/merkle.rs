//! Merkle tree over a block's transaction serializations.
//!
//! Bottom-up, binary, SHA-256, no domain separation between leaf and
//! internal node hashing beyond the data they cover. When a level has an
//! odd number of nodes the last one is duplicated — this applies at the
//! leaf level too, so a single-transaction block's root is
//! `SHA256(leaf || leaf)`, not the leaf hash itself.

use crate::hash::{sha256, Hash256};

/// Hash of one leaf's serialized bytes.
fn leaf_hash(leaf_bytes: &[u8]) -> Hash256 {
    Hash256::from_bytes(sha256(leaf_bytes))
}

/// Hash of an internal node from its two children.
fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    Hash256::from_bytes(sha256(&buf))
}

/// Compute the Merkle root over an ordered sequence of leaf serializations.
///
/// # Panics
///
/// Panics if `leaves` is empty — every block must carry at least a
/// coinbase transaction, so an empty leaf set is a caller bug, not a
/// recoverable condition.
pub fn merkle_root(leaves: &[Vec<u8>]) -> Hash256 {
    assert!(!leaves.is_empty(), "merkle_root requires at least one leaf");

    let mut level: Vec<Hash256> = leaves.iter().map(|l| leaf_hash(l)).collect();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| node_hash(&pair[0], &pair[1]))
            .collect();
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_root_is_not_the_leaf_hash() {
        let leaf = b"only-transaction".to_vec();
        let root = merkle_root(std::slice::from_ref(&leaf));
        let lh = leaf_hash(&leaf);
        assert_ne!(root, lh);
        assert_eq!(root, node_hash(&lh, &lh));
    }

    #[test]
    fn two_leaves_root_matches_manual_computation() {
        let a = b"tx-a".to_vec();
        let b = b"tx-b".to_vec();
        let expected = node_hash(&leaf_hash(&a), &leaf_hash(&b));
        assert_eq!(merkle_root(&[a, b]), expected);
    }

    #[test]
    fn three_leaves_duplicates_the_last() {
        let a = b"tx-a".to_vec();
        let b = b"tx-b".to_vec();
        let c = b"tx-c".to_vec();
        let left = node_hash(&leaf_hash(&a), &leaf_hash(&b));
        let right = node_hash(&leaf_hash(&c), &leaf_hash(&c));
        let expected = node_hash(&left, &right);
        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn root_is_deterministic() {
        let leaves = vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec(), b"w".to_vec()];
        assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
    }

    #[test]
    #[should_panic]
    fn empty_leaves_panics() {
        merkle_root(&[]);
    }
}
