//! Error types for the core protocol layer: encoding, addresses, and signatures.

use thiserror::Error;

/// Errors raised by hashing, address, transaction, and PoW primitives.
///
/// `rill-chain`, `rill-wallet`, and `rill-network` each wrap this in their
/// own top-level error via `#[from]` rather than redefining these variants.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("signature verification failed on input {index}")]
    SignatureInvalid { index: usize },

    #[error("block does not satisfy the proof-of-work target")]
    PoWInvalid,

    #[error("codec error: {0}")]
    CodecError(String),

    #[error("transaction has no inputs or outputs")]
    EmptyTransaction,

    #[error("block has no transactions")]
    EmptyBlock,

    #[error("invalid coinbase: {0}")]
    InvalidCoinbase(String),
}
