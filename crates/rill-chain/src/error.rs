//! Chain store and UTXO index errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("chain already exists")]
    ChainExists,

    #[error("no existing chain")]
    NoChain,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Core(#[from] rill_core::error::CoreError),
}
