//! Persistent chain store: block-by-hash storage, the `lh` tip pointer,
//! best-height tracking, and restartable iteration to genesis.

use std::path::Path;

use parking_lot::Mutex;
use rill_core::codec;
use rill_core::hash::{hash160, Hash256};
use rill_core::types::{Block, Transaction};

use crate::error::ChainError;
use crate::kv::{block_key, Kv, LAST_HASH_KEY};

/// A persistent chain store. `last_hash` is cached in memory and kept in
/// sync with the on-disk `lh` pointer; every read-modify-write of it is
/// serialized through `last_hash`'s own mutex — this is the "process-global,
/// explicitly synchronized" state the concurrency model calls for.
pub struct Chain {
    kv: Kv,
    last_hash: Mutex<Hash256>,
}

impl Chain {
    /// Create a new chain database and mine its genesis block, paying the
    /// block reward to `address`. Fails with [`ChainError::ChainExists`]
    /// if a chain is already present at `path`.
    pub fn init(path: impl AsRef<Path>, address: rill_core::address::Address, difficulty: u32) -> Result<Self, ChainError> {
        let kv = Kv::open(path)?;
        if kv.has_chain()? {
            return Err(ChainError::ChainExists);
        }
        let genesis = rill_core::genesis::genesis_block(address.pub_key_hash(), difficulty)?;
        tracing::info!(hash = %genesis.hash, "mined genesis block");
        let block_bytes = codec::encode(&genesis)?;
        kv.transaction(|txn| {
            txn.put(block_key(&genesis.hash), &block_bytes)
                .map_err(|e| ChainError::StorageError(e.to_string()))?;
            txn.put(LAST_HASH_KEY, genesis.hash.as_bytes())
                .map_err(|e| ChainError::StorageError(e.to_string()))?;
            Ok(())
        })?;
        Ok(Self {
            kv,
            last_hash: Mutex::new(genesis.hash),
        })
    }

    /// Open an existing chain database. Fails with [`ChainError::NoChain`]
    /// if none is present.
    pub fn continue_existing(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let kv = Kv::open(path)?;
        if !kv.has_chain()? {
            return Err(ChainError::NoChain);
        }
        let last_hash = kv
            .get(LAST_HASH_KEY)?
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(Hash256::from_bytes)
            .ok_or_else(|| ChainError::StorageError("corrupt lh pointer".into()))?;
        Ok(Self {
            kv,
            last_hash: Mutex::new(last_hash),
        })
    }

    pub fn last_hash(&self) -> Hash256 {
        *self.last_hash.lock()
    }

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ChainError> {
        match self.kv.get(&block_key(hash))? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Walk `prev_hash` from the current tip to genesis, returning the
    /// hashes in that (newest-first) order.
    pub fn get_block_hashes(&self) -> Result<Vec<Hash256>, ChainError> {
        let mut hashes = Vec::new();
        let mut cursor = self.last_hash();
        loop {
            let block = self
                .get_block(&cursor)?
                .ok_or_else(|| ChainError::NotFound(cursor.to_string()))?;
            hashes.push(cursor);
            if block.is_genesis() {
                break;
            }
            cursor = block.prev_hash;
        }
        Ok(hashes)
    }

    pub fn get_best_height(&self) -> Result<u64, ChainError> {
        let tip = self.last_hash();
        let block = self
            .get_block(&tip)?
            .ok_or_else(|| ChainError::NotFound(tip.to_string()))?;
        Ok(block.height)
    }

    /// Persist `block` if not already present. If it extends the chain
    /// past the current best height, advance the `lh` pointer.
    ///
    /// Idempotent by hash: adding the same block twice leaves the store
    /// unchanged after the first call. Does not validate PoW or
    /// transactions — that is the caller's responsibility.
    pub fn add_block(&self, block: &Block) -> Result<(), ChainError> {
        if self.get_block(&block.hash)?.is_some() {
            return Ok(());
        }
        let block_bytes = codec::encode(block)?;
        let mut last_hash = self.last_hash.lock();
        let current_best = self
            .get_block(&last_hash)?
            .ok_or_else(|| ChainError::NotFound(last_hash.to_string()))?
            .height;

        self.kv.transaction(|txn| {
            txn.put(block_key(&block.hash), &block_bytes)
                .map_err(|e| ChainError::StorageError(e.to_string()))?;
            if block.height > current_best {
                txn.put(LAST_HASH_KEY, block.hash.as_bytes())
                    .map_err(|e| ChainError::StorageError(e.to_string()))?;
            }
            Ok(())
        })?;

        if block.height > current_best {
            *last_hash = block.hash;
        }
        Ok(())
    }

    /// Mine a new block on top of the current tip containing `txs`, persist
    /// it, and advance `lh`.
    pub fn mine_block(&self, txs: Vec<Transaction>, difficulty: u32) -> Result<Block, ChainError> {
        let mut last_hash = self.last_hash.lock();
        let tip = self
            .get_block(&last_hash)?
            .ok_or_else(|| ChainError::NotFound(last_hash.to_string()))?;
        let block = Block::create(txs, tip.hash, tip.height + 1, difficulty)?;
        let block_bytes = codec::encode(&block)?;

        self.kv.transaction(|txn| {
            txn.put(block_key(&block.hash), &block_bytes)
                .map_err(|e| ChainError::StorageError(e.to_string()))?;
            txn.put(LAST_HASH_KEY, block.hash.as_bytes())
                .map_err(|e| ChainError::StorageError(e.to_string()))?;
            Ok(())
        })?;
        *last_hash = block.hash;
        tracing::info!(height = block.height, hash = %block.hash, "mined block");
        Ok(block)
    }

    /// A restartable, single-threaded iterator from the current tip to
    /// genesis. Borrows the store for its lifetime.
    pub fn iter(&self) -> ChainIterator<'_> {
        ChainIterator {
            chain: self,
            cursor: Some(self.last_hash()),
        }
    }

    pub(crate) fn kv(&self) -> &Kv {
        &self.kv
    }
}

/// Iterates blocks from the chain tip down to genesis, inclusive.
pub struct ChainIterator<'a> {
    chain: &'a Chain,
    cursor: Option<Hash256>,
}

impl<'a> Iterator for ChainIterator<'a> {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.cursor.take()?;
        match self.chain.get_block(&hash) {
            Ok(Some(block)) => {
                if !block.is_genesis() {
                    self.cursor = Some(block.prev_hash);
                }
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::NotFound(hash.to_string()))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Derive a `pub_key_hash` from a Base58Check address string, mapping a bad
/// checksum to [`ChainError`] via [`rill_core::error::CoreError`].
pub fn pub_key_hash_for_address(address: &str) -> Result<rill_core::hash::PubKeyHash, ChainError> {
    Ok(rill_core::address::Address::decode(address)?.pub_key_hash())
}

/// Exposed for callers that already have raw bytes (coinbase data path,
/// tests) rather than an address string.
pub fn pub_key_hash_for_bytes(public_key: &[u8]) -> rill_core::hash::PubKeyHash {
    hash160(public_key)
}
