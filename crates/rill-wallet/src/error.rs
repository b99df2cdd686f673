//! Wallet errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("wallet not found for address {0}")]
    NotFound(String),

    #[error("wallet file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted wallet file: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Core(#[from] rill_core::error::CoreError),
}
