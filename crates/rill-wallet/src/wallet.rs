//! A file-backed store of wallets, keyed by their address string.
//!
//! One file per node (`wallets_<NODE_ID>.data`), holding a serialized map
//! from address to the private scalar that derives it. The public key and
//! address are always re-derived on load rather than stored redundantly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::keys::Wallet;

#[derive(Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct WalletRecord {
    secret_bytes: [u8; 32],
}

/// The on-disk format: address string -> wallet record.
#[derive(Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct WalletFile {
    wallets: HashMap<String, WalletRecord>,
}

/// A collection of wallets persisted at a single path.
pub struct WalletStore {
    path: PathBuf,
    wallets: HashMap<String, Wallet>,
}

impl WalletStore {
    /// Load the store at `path` if it exists, or start empty.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                wallets: HashMap::new(),
            });
        }
        let bytes = std::fs::read(&path)?;
        let file: WalletFile = rill_core::codec::decode(&bytes)
            .map_err(|_| WalletError::Corrupted(path.display().to_string()))?;
        let mut wallets = HashMap::new();
        for (address, mut record) in file.wallets {
            let wallet = Wallet::from_secret_bytes(&record.secret_bytes)?;
            record.secret_bytes.zeroize();
            wallets.insert(address, wallet);
        }
        Ok(Self { path, wallets })
    }

    /// Persist the current contents to `self.path`, creating parent
    /// directories as needed.
    pub fn save(&self) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = WalletFile::default();
        for (address, wallet) in &self.wallets {
            file.wallets.insert(
                address.clone(),
                WalletRecord {
                    secret_bytes: wallet.secret_bytes(),
                },
            );
        }
        let bytes = rill_core::codec::encode(&file)?;
        std::fs::write(&self.path, bytes)?;
        tracing::info!(path = %self.path.display(), count = self.wallets.len(), "saved wallet file");
        Ok(())
    }

    /// Generate a new wallet, add it to the store, and return its address
    /// string. Does not persist — call [`Self::save`] afterward.
    pub fn add_wallet(&mut self) -> String {
        let wallet = Wallet::generate();
        let address = wallet.address().encode();
        self.wallets.insert(address.clone(), wallet);
        address
    }

    pub fn get(&self, address: &str) -> Result<&Wallet, WalletError> {
        self.wallets
            .get(address)
            .ok_or_else(|| WalletError::NotFound(address.to_string()))
    }

    pub fn addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

/// The conventional per-node wallet file path: `<wallets_root>/wallets_<node_id>.data`.
pub fn wallet_path(wallets_root: impl AsRef<Path>, node_id: &str) -> PathBuf {
    wallets_root.as_ref().join(format!("wallets_{node_id}.data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_wallet_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = WalletStore::load_or_create(dir.path().join("wallets.data")).unwrap();
        let address = store.add_wallet();
        assert!(store.get(&address).is_ok());
        assert_eq!(store.addresses(), vec![address]);
    }

    #[test]
    fn save_then_reload_preserves_wallets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallets.data");
        let address = {
            let mut store = WalletStore::load_or_create(&path).unwrap();
            let address = store.add_wallet();
            store.save().unwrap();
            address
        };

        let reloaded = WalletStore::load_or_create(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let wallet = reloaded.get(&address).unwrap();
        assert_eq!(wallet.address().encode(), address);
    }

    #[test]
    fn loading_a_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::load_or_create(dir.path().join("absent.data")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn get_missing_address_fails_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::load_or_create(dir.path().join("wallets.data")).unwrap();
        let err = store.get("nonexistent").unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
    }

    #[test]
    fn wallet_path_matches_the_node_id_convention() {
        let path = wallet_path("/tmp/wallets", "3000");
        assert_eq!(path, PathBuf::from("/tmp/wallets/wallets_3000.data"));
    }
}
