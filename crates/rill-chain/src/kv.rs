//! The abstract transactional key-value operations the chain store and
//! UTXO index are built on: point get/set/delete, prefix scan, drop by
//! prefix, and read/update transactions with read-your-writes semantics
//! inside one transaction.
//!
//! Backed by RocksDB's [`rocksdb::TransactionDB`] rather than the plain
//! `DB` + `WriteBatch` combination used elsewhere in the corpus, because
//! read-your-writes across an explicit multi-step update (as `Update`
//! needs in §4.6) requires a real transaction handle, not just an atomic
//! batch of writes decided up front.

use std::path::Path;

use rocksdb::{TransactionDB, TransactionDBOptions};

use crate::error::ChainError;

/// A single key-value store backing both the chain store and the UTXO
/// index, in one flat keyspace: a block's key is its own raw 32-byte hash,
/// plus the two prefixed key families `lh` and `utxo-<txid>`.
pub struct Kv {
    pub(crate) db: TransactionDB,
}

impl Kv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let txn_opts = TransactionDBOptions::default();
        let db = TransactionDB::open(&opts, &txn_opts, path.as_ref())
            .map_err(|e| ChainError::StorageError(e.to_string()))?;
        Ok(Self { db })
    }

    /// `true` if the database directory already contains chain state
    /// (i.e. the `lh` pointer exists).
    pub fn has_chain(&self) -> Result<bool, ChainError> {
        Ok(self
            .db
            .get(LAST_HASH_KEY)
            .map_err(|e| ChainError::StorageError(e.to_string()))?
            .is_some())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ChainError> {
        self.db
            .get(key)
            .map_err(|e| ChainError::StorageError(e.to_string()))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), ChainError> {
        self.db
            .put(key, value)
            .map_err(|e| ChainError::StorageError(e.to_string()))
    }

    /// Run `f` inside a read/update transaction. Reads inside `f` observe
    /// this transaction's own writes. On `Ok`, the transaction commits; on
    /// `Err`, it rolls back and the error propagates.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, ChainError>
    where
        F: FnOnce(&rocksdb::Transaction<'_, TransactionDB>) -> Result<T, ChainError>,
    {
        let txn = self.db.transaction();
        let result = f(&txn)?;
        txn.commit()
            .map_err(|e| ChainError::StorageError(e.to_string()))?;
        Ok(result)
    }

    /// All key-value pairs whose key starts with `prefix`.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ChainError> {
        let mut out = Vec::new();
        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item.map_err(|e| ChainError::StorageError(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Delete every key starting with `prefix`.
    pub fn drop_prefix(&self, prefix: &[u8]) -> Result<(), ChainError> {
        let keys: Vec<Vec<u8>> = self
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let mut batch = rocksdb::WriteBatch::default();
        for key in keys {
            batch.delete(key);
        }
        self.db
            .write(batch)
            .map_err(|e| ChainError::StorageError(e.to_string()))
    }
}

pub const LAST_HASH_KEY: &[u8] = b"lh";
pub const UTXO_PREFIX: &[u8] = b"utxo-";

/// A block's key is its own raw 32-byte hash, not a prefixed key — it
/// shares the default keyspace with `lh` and `utxo-<txid>` but can't
/// collide with either given the fixed, distinct lengths involved.
pub fn block_key(hash: &rill_core::hash::Hash256) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

pub fn utxo_key(txid: &rill_core::hash::Hash256) -> Vec<u8> {
    let mut k = UTXO_PREFIX.to_vec();
    k.extend_from_slice(txid.as_bytes());
    k
}
