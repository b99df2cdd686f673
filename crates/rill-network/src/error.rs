//! Network protocol errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed payload: {0}")]
    Codec(String),

    #[error(transparent)]
    Chain(#[from] rill_chain::ChainError),

    #[error(transparent)]
    Core(#[from] rill_core::error::CoreError),
}
