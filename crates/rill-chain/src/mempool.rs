//! The in-memory pool of transactions waiting to be mined.

use std::collections::HashMap;

use parking_lot::Mutex;
use rill_core::hash::Hash256;
use rill_core::types::Transaction;

/// A thread-safe map from transaction id to the pending transaction itself.
/// Process-local only — never persisted, rebuilt from nothing on restart.
#[derive(Default)]
pub struct Mempool {
    transactions: Mutex<HashMap<Hash256, Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tx: Transaction) {
        self.transactions.lock().insert(tx.id, tx);
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.transactions.lock().contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<Transaction> {
        self.transactions.lock().get(txid).cloned()
    }

    pub fn remove(&self, txid: &Hash256) -> Option<Transaction> {
        self.transactions.lock().remove(txid)
    }

    pub fn len(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every pending transaction, in no particular order.
    pub fn drain_all(&self) -> Vec<Transaction> {
        self.transactions.lock().drain().map(|(_, tx)| tx).collect()
    }

    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.lock().values().cloned().collect()
    }
}
