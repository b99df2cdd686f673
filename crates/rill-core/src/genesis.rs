//! Genesis block construction.
//!
//! Unlike a fixed, hardcoded genesis, this protocol's genesis coinbase pays
//! a caller-supplied address (the node operator's own address passed to
//! `Init`), so there is no single canonical genesis block shared by every
//! deployment — each chain's genesis is deterministic given its recipient
//! and difficulty, not deterministic across chains.

use crate::error::CoreError;
use crate::hash::PubKeyHash;
use crate::pow::DEFAULT_DIFFICULTY;
use crate::types::{Block, Transaction};

/// Build the genesis block: a single coinbase transaction paying `to`,
/// mined at `difficulty`.
pub fn genesis_block(to: PubKeyHash, difficulty: u32) -> Result<Block, CoreError> {
    let coinbase = Transaction::new_coinbase(to, Vec::new());
    Block::genesis(coinbase, difficulty)
}

/// Convenience wrapper using [`DEFAULT_DIFFICULTY`].
pub fn genesis_block_default_difficulty(to: PubKeyHash) -> Result<Block, CoreError> {
    genesis_block(to, DEFAULT_DIFFICULTY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_pays_the_given_recipient() {
        let to = PubKeyHash::from_bytes([0x11; 20]);
        let block = genesis_block_default_difficulty(to).unwrap();
        let coinbase = block.coinbase().unwrap();
        assert_eq!(coinbase.outputs[0].pub_key_hash, to);
        assert_eq!(coinbase.outputs[0].value, crate::constants::COINBASE_REWARD);
    }

    #[test]
    fn genesis_is_height_zero_with_empty_prev_hash() {
        let block = genesis_block_default_difficulty(PubKeyHash::from_bytes([2; 20])).unwrap();
        assert_eq!(block.height, 0);
        assert!(block.prev_hash.is_zero());
    }

    #[test]
    fn different_recipients_produce_different_genesis_hashes() {
        let a = genesis_block_default_difficulty(PubKeyHash::from_bytes([1; 20])).unwrap();
        let b = genesis_block_default_difficulty(PubKeyHash::from_bytes([2; 20])).unwrap();
        assert_ne!(a.hash, b.hash);
    }
}
