//! # rill-wallet — key generation, addressing, and a file-backed wallet store.

pub mod error;
pub mod keys;
pub mod wallet;

pub use error::WalletError;
pub use keys::Wallet;
pub use wallet::{wallet_path, WalletStore};
