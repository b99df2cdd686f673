//! A single wallet: a P-256 key pair plus its derived address.

use rill_core::address::Address;
use rill_core::crypto::{KeyPair, PublicKey};
use rill_core::hash::PubKeyHash;

use crate::error::WalletError;

/// One key pair and the address it locks funds to. Never `Debug`s the
/// private scalar — only `secret_bytes` exposes it, for serialization.
pub struct Wallet {
    key_pair: KeyPair,
}

impl Wallet {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self {
            key_pair: KeyPair::generate(),
        }
    }

    /// Reconstruct from a persisted 32-byte private scalar.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        Ok(Self {
            key_pair: KeyPair::from_secret_bytes(bytes)?,
        })
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.key_pair.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        self.key_pair.public_key()
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        self.key_pair.public_key().pub_key_hash()
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key_hash(self.pub_key_hash())
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_wallet_address_round_trips() {
        let wallet = Wallet::generate();
        let address = wallet.address();
        assert_eq!(Address::decode(&address.encode()).unwrap(), address);
    }

    #[test]
    fn secret_bytes_round_trip_to_the_same_address() {
        let wallet = Wallet::generate();
        let bytes = wallet.secret_bytes();
        let restored = Wallet::from_secret_bytes(&bytes).unwrap();
        assert_eq!(wallet.address(), restored.address());
    }

    #[test]
    fn two_generated_wallets_have_different_addresses() {
        let a = Wallet::generate();
        let b = Wallet::generate();
        assert_ne!(a.address(), b.address());
    }
}
