//! Core protocol types: transactions, blocks, and their canonical
//! serializations.
//!
//! A transaction has two distinct serialized forms: the *full* form
//! (carries `id`) and the *hashing* form (`id` cleared to zero). The
//! hashing form derives `id` itself, derives the per-input signing
//! preimage (see [`Transaction::trimmed_copy`]), and is the Merkle leaf
//! content within a block.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::{KeyPair, PublicKey};
use crate::error::CoreError;
use crate::hash::{sha256, Hash256, PubKeyHash};
use crate::merkle;
use crate::pow;

/// Marker used for `ref_out_index` on a coinbase input.
pub const COINBASE_OUT_INDEX: i64 = -1;

/// A reference to a previous output, spent by a [`TxInput`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxInput {
    /// Transaction id of the referenced output. Empty (`Hash256::ZERO`) for coinbase.
    pub ref_tx_id: Hash256,
    /// Index of the referenced output. `-1` for coinbase.
    pub ref_out_index: i64,
    /// `r || s` signature bytes. Empty before signing.
    pub signature: Vec<u8>,
    /// Coinbase: arbitrary data. Transfer: the spender's raw public key (`x || y`).
    pub pub_key: Vec<u8>,
}

/// A new unspent output created by a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxOutput {
    pub value: u64,
    pub pub_key_hash: PubKeyHash,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: PubKeyHash) -> Self {
        Self { value, pub_key_hash }
    }

    /// `true` if this output is locked to `pub_key_hash`.
    pub fn is_locked_with(&self, pub_key_hash: &PubKeyHash) -> bool {
        &self.pub_key_hash == pub_key_hash
    }
}

/// Serialization wrapper around the outputs still unspent for one
/// transaction — the value type stored under `utxo-<txid>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxOutputs {
    pub outputs: Vec<(u64, TxOutput)>,
}

impl TxOutputs {
    pub fn new(outputs: Vec<(u64, TxOutput)>) -> Self {
        Self { outputs }
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// A transaction: its own id plus an ordered list of inputs and outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// `true` if this is the block-reward transaction: exactly one input
    /// with an empty reference and out-index `-1`.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].ref_tx_id.is_zero()
            && self.inputs[0].ref_out_index == COINBASE_OUT_INDEX
    }

    /// Build and sign a coinbase transaction paying [`crate::constants::COINBASE_REWARD`]
    /// to `to`. `data` defaults to 20 random bytes when empty.
    pub fn new_coinbase(to: PubKeyHash, mut data: Vec<u8>) -> Self {
        if data.is_empty() {
            use rand::RngCore;
            let mut buf = vec![0u8; crate::constants::DEFAULT_COINBASE_DATA_LEN];
            rand::rngs::OsRng.fill_bytes(&mut buf);
            data = buf;
        }
        let input = TxInput {
            ref_tx_id: Hash256::ZERO,
            ref_out_index: COINBASE_OUT_INDEX,
            signature: Vec::new(),
            pub_key: data,
        };
        let output = TxOutput::new(crate::constants::COINBASE_REWARD, to);
        let mut tx = Transaction {
            id: Hash256::ZERO,
            inputs: vec![input],
            outputs: vec![output],
        };
        tx.id = tx.compute_id();
        tx
    }

    /// The full serialized form, with `id` set.
    pub fn serialize_full(&self) -> Result<Vec<u8>, CoreError> {
        codec::encode(self)
    }

    /// A copy with `id` cleared — the form used to derive `id` itself and
    /// as Merkle leaf content.
    pub fn hashing_form(&self) -> Transaction {
        let mut t = self.clone();
        t.id = Hash256::ZERO;
        t
    }

    pub fn serialize_hashing_form(&self) -> Result<Vec<u8>, CoreError> {
        codec::encode(&self.hashing_form())
    }

    /// `SHA256(serialize(hashing_form))`.
    pub fn compute_id(&self) -> Hash256 {
        let bytes = self
            .serialize_hashing_form()
            .expect("transaction always encodes");
        Hash256::from_bytes(sha256(&bytes))
    }

    /// A trimmed copy used as the basis for both signing and verification:
    /// every input's `signature`/`pub_key` cleared, `id` cleared.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .inputs
            .iter()
            .map(|i| TxInput {
                ref_tx_id: i.ref_tx_id,
                ref_out_index: i.ref_out_index,
                signature: Vec::new(),
                pub_key: Vec::new(),
            })
            .collect();
        Transaction {
            id: Hash256::ZERO,
            inputs,
            outputs: self.outputs.clone(),
        }
    }

    /// The per-input signing digest: the trimmed copy's id after
    /// temporarily carrying `prev_out_pub_key_hash` on input `index`.
    fn signing_digest(trimmed: &mut Transaction, index: usize, prev_out_pub_key_hash: &PubKeyHash) -> Hash256 {
        trimmed.inputs[index].pub_key = prev_out_pub_key_hash.as_bytes().to_vec();
        trimmed.id = trimmed.compute_id();
        trimmed.inputs[index].pub_key.clear();
        trimmed.id
    }

    /// Sign every non-coinbase input. `lookup` resolves a referenced
    /// output's `pub_key_hash` given `(ref_tx_id, ref_out_index)`; it fails
    /// with [`CoreError::InvalidCoinbase`]-flavored errors turned into
    /// `CodecError` if a reference cannot be resolved (the caller is
    /// expected to have already validated the UTXO exists).
    pub fn sign<F>(&mut self, key_pair: &KeyPair, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&Hash256, i64) -> Option<PubKeyHash>,
    {
        if self.is_coinbase() {
            return Ok(());
        }
        let mut trimmed = self.trimmed_copy();
        for index in 0..self.inputs.len() {
            let input = &self.inputs[index];
            let prev_pkh = lookup(&input.ref_tx_id, input.ref_out_index).ok_or_else(|| {
                CoreError::CodecError(format!(
                    "cannot resolve previous output {}:{}",
                    input.ref_tx_id, input.ref_out_index
                ))
            })?;
            let digest = Self::signing_digest(&mut trimmed, index, &prev_pkh);
            let signature = key_pair.sign_prehash(digest.as_bytes())?;
            self.inputs[index].signature = signature.to_vec();
        }
        Ok(())
    }

    /// Verify every input's signature. Coinbase transactions always verify.
    pub fn verify<F>(&self, lookup: F) -> bool
    where
        F: Fn(&Hash256, i64) -> Option<PubKeyHash>,
    {
        self.try_verify(lookup).is_ok()
    }

    /// Like [`Transaction::verify`], but reports which input failed.
    /// Coinbase transactions always verify.
    pub fn try_verify<F>(&self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&Hash256, i64) -> Option<PubKeyHash>,
    {
        if self.is_coinbase() {
            return Ok(());
        }
        let mut trimmed = self.trimmed_copy();
        for (index, input) in self.inputs.iter().enumerate() {
            let Some(prev_pkh) = lookup(&input.ref_tx_id, input.ref_out_index) else {
                return Err(CoreError::SignatureInvalid { index });
            };
            let digest = Self::signing_digest(&mut trimmed, index, &prev_pkh);
            let Ok(public_key) = PublicKey::from_xy_bytes(&input.pub_key) else {
                return Err(CoreError::SignatureInvalid { index });
            };
            if !public_key.verify_prehash(digest.as_bytes(), &input.signature) {
                return Err(CoreError::SignatureInvalid { index });
            }
        }
        Ok(())
    }

    /// Sum of this transaction's output values.
    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// A block header plus its ordered transaction list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    pub timestamp: i64,
    pub nonce: u64,
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Merkle root of `[tx.serialize_hashing_form() for tx in transactions]`.
    pub fn hash_transactions(&self) -> Hash256 {
        let leaves: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(|tx| {
                tx.serialize_hashing_form()
                    .expect("transaction always encodes")
            })
            .collect();
        merkle::merkle_root(&leaves)
    }

    /// The block's coinbase transaction, if present (always the first).
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Construct a block from `transactions`, run proof-of-work over it,
    /// and stamp `timestamp`/`nonce`/`hash`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::EmptyBlock`] if `transactions` is empty,
    /// [`CoreError::EmptyTransaction`] if any transaction has no inputs or
    /// outputs, [`CoreError::InvalidCoinbase`] if a coinbase transaction
    /// appears anywhere but first, and [`CoreError::PoWInvalid`] if the
    /// nonce space is exhausted (not expected at the configured difficulty).
    pub fn create(
        transactions: Vec<Transaction>,
        prev_hash: Hash256,
        height: u64,
        difficulty: u32,
    ) -> Result<Self, CoreError> {
        if transactions.is_empty() {
            return Err(CoreError::EmptyBlock);
        }
        for (index, tx) in transactions.iter().enumerate() {
            if tx.inputs.is_empty() || tx.outputs.is_empty() {
                return Err(CoreError::EmptyTransaction);
            }
            if tx.is_coinbase() && index != 0 {
                return Err(CoreError::InvalidCoinbase(format!(
                    "coinbase transaction at index {index}, must be first"
                )));
            }
        }
        let mut block = Block {
            timestamp: 0,
            nonce: 0,
            hash: Hash256::ZERO,
            prev_hash,
            height,
            transactions,
        };
        let root = block.hash_transactions();
        let timestamp = current_unix_timestamp();
        let proof = pow::run(&prev_hash, &root, timestamp, difficulty).ok_or(CoreError::PoWInvalid)?;
        block.timestamp = timestamp;
        block.nonce = proof.nonce;
        block.hash = proof.hash;
        Ok(block)
    }

    /// `true` if `hash` satisfies the PoW target for `difficulty` and was
    /// computed over this block's actual preimage.
    pub fn validate_pow(&self, difficulty: u32) -> bool {
        let root = self.hash_transactions();
        pow::validate(&self.prev_hash, &root, self.timestamp, difficulty, self.nonce, &self.hash)
    }

    /// `Genesis(coinbase) = create([coinbase], empty, 0, difficulty)`.
    pub fn genesis(coinbase: Transaction, difficulty: u32) -> Result<Self, CoreError> {
        Self::create(vec![coinbase], Hash256::ZERO, 0, difficulty)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash.is_zero()
    }
}

fn current_unix_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before 1970")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::DEFAULT_DIFFICULTY;
    use proptest::prelude::*;

    fn pkh(byte: u8) -> PubKeyHash {
        PubKeyHash::from_bytes([byte; 20])
    }

    #[test]
    fn coinbase_has_expected_shape() {
        let tx = Transaction::new_coinbase(pkh(1), vec![]);
        assert!(tx.is_coinbase());
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, crate::constants::COINBASE_REWARD);
        assert_eq!(tx.id, tx.compute_id());
    }

    #[test]
    fn coinbase_always_verifies() {
        let tx = Transaction::new_coinbase(pkh(2), vec![]);
        assert!(tx.verify(|_, _| None));
    }

    #[test]
    fn transaction_round_trips_through_serialization() {
        let tx = Transaction::new_coinbase(pkh(3), b"fixed-data".to_vec());
        let bytes = tx.serialize_full().unwrap();
        let back: Transaction = codec::decode(&bytes).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key_pair = KeyPair::generate();
        let prev_pkh = key_pair.public_key().pub_key_hash();

        let mut tx = Transaction {
            id: Hash256::ZERO,
            inputs: vec![TxInput {
                ref_tx_id: Hash256::from_bytes([9u8; 32]),
                ref_out_index: 0,
                signature: Vec::new(),
                pub_key: key_pair.public_key().to_xy_bytes().to_vec(),
            }],
            outputs: vec![TxOutput::new(5, pkh(4))],
        };
        tx.id = tx.compute_id();
        tx.sign(&key_pair, |_, _| Some(prev_pkh)).unwrap();

        assert!(tx.verify(|_, _| Some(prev_pkh)));
    }

    #[test]
    fn mutating_any_field_breaks_verification() {
        let key_pair = KeyPair::generate();
        let prev_pkh = key_pair.public_key().pub_key_hash();
        let mut tx = Transaction {
            id: Hash256::ZERO,
            inputs: vec![TxInput {
                ref_tx_id: Hash256::from_bytes([1u8; 32]),
                ref_out_index: 0,
                signature: Vec::new(),
                pub_key: key_pair.public_key().to_xy_bytes().to_vec(),
            }],
            outputs: vec![TxOutput::new(7, pkh(5))],
        };
        tx.id = tx.compute_id();
        tx.sign(&key_pair, |_, _| Some(prev_pkh)).unwrap();
        assert!(tx.verify(|_, _| Some(prev_pkh)));

        let mut mutated = tx.clone();
        mutated.outputs[0].value += 1;
        assert!(!mutated.verify(|_, _| Some(prev_pkh)));

        let mut mutated_sig = tx.clone();
        mutated_sig.inputs[0].signature[0] ^= 0xff;
        assert!(!mutated_sig.verify(|_, _| Some(prev_pkh)));

        let mut mutated_id = tx.clone();
        mutated_id.id = Hash256::from_bytes([0xaa; 32]);
        // id mutation alone doesn't feed the signature digest, but a real
        // chain would reject it via the id-recompute invariant separately.
        assert_eq!(mutated_id.compute_id(), tx.compute_id());
    }

    #[test]
    fn block_pow_is_sound_and_validates() {
        let coinbase = Transaction::new_coinbase(pkh(6), vec![]);
        let block = Block::genesis(coinbase, DEFAULT_DIFFICULTY).unwrap();
        assert!(block.validate_pow(DEFAULT_DIFFICULTY));
        assert!(block.is_genesis());
    }

    #[test]
    fn flipping_the_nonce_breaks_pow_validation() {
        let coinbase = Transaction::new_coinbase(pkh(7), vec![]);
        let mut block = Block::genesis(coinbase, DEFAULT_DIFFICULTY).unwrap();
        block.nonce ^= 1;
        assert!(!block.validate_pow(DEFAULT_DIFFICULTY));
    }

    #[test]
    fn block_round_trips_through_serialization() {
        let coinbase = Transaction::new_coinbase(pkh(8), vec![]);
        let block = Block::genesis(coinbase, DEFAULT_DIFFICULTY).unwrap();
        let bytes = codec::encode(&block).unwrap();
        let back: Block = codec::decode(&bytes).unwrap();
        assert_eq!(block, back);
    }

    #[test]
    fn single_tx_block_merkle_root_duplicates_the_leaf() {
        let coinbase = Transaction::new_coinbase(pkh(9), vec![]);
        let leaf = coinbase.serialize_hashing_form().unwrap();
        let expected = merkle::merkle_root(&[leaf]);
        let block = Block::genesis(coinbase, DEFAULT_DIFFICULTY).unwrap();
        assert_eq!(block.hash_transactions(), expected);
    }

    #[test]
    fn try_verify_reports_the_failing_input_index() {
        let key_pair = KeyPair::generate();
        let prev_pkh = key_pair.public_key().pub_key_hash();
        let mut tx = Transaction {
            id: Hash256::ZERO,
            inputs: vec![TxInput {
                ref_tx_id: Hash256::from_bytes([1u8; 32]),
                ref_out_index: 0,
                signature: Vec::new(),
                pub_key: key_pair.public_key().to_xy_bytes().to_vec(),
            }],
            outputs: vec![TxOutput::new(3, pkh(10))],
        };
        tx.id = tx.compute_id();
        tx.sign(&key_pair, |_, _| Some(prev_pkh)).unwrap();

        let err = tx.try_verify(|_, _| None).unwrap_err();
        assert!(matches!(err, CoreError::SignatureInvalid { index: 0 }));
    }

    #[test]
    fn block_create_rejects_a_transaction_with_no_inputs_or_outputs() {
        let coinbase = Transaction::new_coinbase(pkh(11), vec![]);
        let empty = Transaction {
            id: Hash256::ZERO,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        let err = Block::create(vec![coinbase, empty], Hash256::ZERO, 1, DEFAULT_DIFFICULTY).unwrap_err();
        assert!(matches!(err, CoreError::EmptyTransaction));
    }

    #[test]
    fn block_create_rejects_a_coinbase_that_is_not_first() {
        let first = Transaction::new_coinbase(pkh(12), vec![]);
        let second = Transaction::new_coinbase(pkh(13), vec![]);
        let err = Block::create(vec![first, second], Hash256::ZERO, 1, DEFAULT_DIFFICULTY).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCoinbase(_)));
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn coinbase_round_trips_for_any_reward_destination_and_data(
            pub_key_byte in any::<u8>(),
            data in prop::collection::vec(any::<u8>(), 0..32),
        ) {
            let tx = Transaction::new_coinbase(pkh(pub_key_byte), data);
            let bytes = tx.serialize_full().unwrap();
            let back: Transaction = codec::decode(&bytes).unwrap();
            prop_assert_eq!(tx, back);
        }
    }
}
