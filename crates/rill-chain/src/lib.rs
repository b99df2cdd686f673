//! # rill-chain — persistent chain state.
//!
//! Composes the pieces a node needs to hold and extend the ledger:
//! - [`kv`] — the transactional key-value layer everything else is built on
//! - [`store::Chain`] — block storage, the `lh` tip pointer, iteration
//! - [`utxo::UtxoSet`] — the unspent-output secondary index
//! - [`mempool::Mempool`] — transactions waiting to be mined

pub mod error;
pub mod kv;
pub mod mempool;
pub mod store;
pub mod utxo;

pub use error::ChainError;
pub use mempool::Mempool;
pub use store::Chain;
pub use utxo::UtxoSet;
