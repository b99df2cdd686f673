//! Base58Check wallet addresses.
//!
//! `Base58Check(version(1) || pub_key_hash(20) || checksum(4))`, where
//! `checksum` is the first 4 bytes of `SHA256(SHA256(version || pub_key_hash))`
//! and `version = 0x00`. This mirrors Bitcoin-style P2PKH addressing rather
//! than the project's previous Bech32m scheme.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hash::PubKeyHash;

/// The only address version this node produces or accepts.
pub const VERSION: u8 = 0x00;

/// A decoded wallet address: a version byte (always [`VERSION`]) plus the
/// public-key hash it locks funds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub_key_hash: PubKeyHash,
}

impl Address {
    /// Wrap a raw public-key hash as an address.
    pub fn from_pub_key_hash(pub_key_hash: PubKeyHash) -> Self {
        Self { pub_key_hash }
    }

    /// Derive an address directly from an uncompressed public key's bytes.
    pub fn from_pub_key_bytes(pub_key: &[u8]) -> Self {
        Self::from_pub_key_hash(crate::hash::hash160(pub_key))
    }

    pub fn pub_key_hash(&self) -> PubKeyHash {
        self.pub_key_hash
    }

    /// Encode as the Base58Check string form.
    pub fn encode(&self) -> String {
        bs58::encode(self.pub_key_hash.as_bytes())
            .with_check_version(VERSION)
            .into_string()
    }

    /// Decode and validate a Base58Check address string.
    ///
    /// Fails with [`CoreError::InvalidAddress`] on a bad checksum, wrong
    /// version byte, or malformed Base58.
    pub fn decode(s: &str) -> Result<Self, CoreError> {
        let decoded = bs58::decode(s)
            .with_check(Some(VERSION))
            .into_vec()
            .map_err(|e| CoreError::InvalidAddress(e.to_string()))?;

        // `with_check` verifies and strips the checksum but keeps the
        // leading version byte in the decoded payload.
        let payload = &decoded[1..];
        if payload.len() != 20 {
            return Err(CoreError::InvalidAddress(format!(
                "expected 20-byte pubkey hash, got {}",
                payload.len()
            )));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(payload);
        Ok(Self::from_pub_key_hash(PubKeyHash::from_bytes(bytes)))
    }

    /// `true` if the string decodes and checksums correctly.
    pub fn is_valid(s: &str) -> bool {
        Self::decode(s).is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_hash(byte: u8) -> PubKeyHash {
        PubKeyHash::from_bytes([byte; 20])
    }

    #[test]
    fn round_trips_through_string() {
        let addr = Address::from_pub_key_hash(sample_hash(0x42));
        let s = addr.encode();
        let back = Address::decode(&s).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn flipping_a_byte_invalidates_the_address() {
        let addr = Address::from_pub_key_hash(sample_hash(0x07));
        let mut s = addr.encode().into_bytes();
        // Flip a character in the middle of the string, away from either end.
        let mid = s.len() / 2;
        s[mid] = if s[mid] == b'1' { b'2' } else { b'1' };
        let mutated = String::from_utf8(s).unwrap();
        assert!(!Address::is_valid(&mutated));
    }

    #[test]
    fn rejects_garbage_strings() {
        assert!(!Address::is_valid("not a valid address"));
        assert!(!Address::is_valid(""));
    }

    #[test]
    fn encode_is_deterministic() {
        let addr = Address::from_pub_key_hash(sample_hash(0xaa));
        assert_eq!(addr.encode(), addr.encode());
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn any_pub_key_hash_round_trips_through_encode_decode(bytes in any::<[u8; 20]>()) {
            let addr = Address::from_pub_key_hash(PubKeyHash::from_bytes(bytes));
            let decoded = Address::decode(&addr.encode()).unwrap();
            prop_assert_eq!(addr, decoded);
        }

        #[test]
        fn arbitrary_strings_never_panic_decode(s in "\\PC*") {
            let _ = Address::decode(&s);
        }
    }
}
