//! ECDSA over NIST P-256: key pairs and raw signing/verification.
//!
//! Signatures and public keys travel on the wire as raw fixed-width byte
//! pairs (`r || s` and `x || y`), not DER or SEC1-compressed points — this
//! matches the transaction format in [`crate::types`], which has no room
//! for variable-length ASN.1 framing.
//!
//! Signing operates on an already-hashed 32-byte message (the signing
//! preimage's SHA-256 digest from [`crate::types::Transaction`]) via the
//! `ecdsa` crate's prehash API, so the message is hashed exactly once —
//! the digest is never re-hashed by the signature primitive itself.

use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use std::fmt;

use crate::error::CoreError;

/// Width in bytes of a P-256 field element (and so of each signature half).
pub const COORDINATE_WIDTH: usize = 32;

/// A P-256 key pair: a signing key and its derived verifying key.
///
/// `Debug` never prints key material.
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a key pair from a 32-byte scalar (as loaded from a
    /// wallet file).
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CoreError> {
        let signing_key = SigningKey::from_bytes(FieldBytes::from_slice(bytes))
            .map_err(|e| CoreError::InvalidAddress(format!("bad private key: {e}")))?;
        let verifying_key = *signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// The 32-byte scalar backing this key pair.
    pub fn secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.verifying_key)
    }

    /// Sign a 32-byte prehashed digest, returning the raw `r || s` bytes.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<[u8; 64], CoreError> {
        let sig: Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| CoreError::CodecError(format!("signing failed: {e}")))?;
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.to_bytes());
        Ok(out)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("signing_key", &"[REDACTED]")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// A P-256 public key, carried on the wire as raw `x || y` coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse raw uncompressed `x || y` coordinates (64 bytes).
    pub fn from_xy_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != 2 * COORDINATE_WIDTH {
            return Err(CoreError::InvalidAddress(format!(
                "public key must be {} bytes, got {}",
                2 * COORDINATE_WIDTH,
                bytes.len()
            )));
        }
        let (x, y) = bytes.split_at(COORDINATE_WIDTH);
        let encoded = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(x),
            FieldBytes::from_slice(y),
            false,
        );
        let verifying_key = VerifyingKey::from_encoded_point(&encoded)
            .map_err(|e| CoreError::InvalidAddress(format!("invalid public key point: {e}")))?;
        Ok(Self(verifying_key))
    }

    /// Serialize as raw `x || y` coordinates (64 bytes).
    pub fn to_xy_bytes(&self) -> [u8; 64] {
        let point = self.0.to_encoded_point(false);
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(point.x().expect("uncompressed point has x"));
        out[32..].copy_from_slice(point.y().expect("uncompressed point has y"));
        out
    }

    /// `RIPEMD160(SHA256(x || y))` — the P2PKH lock this key controls.
    pub fn pub_key_hash(&self) -> crate::hash::PubKeyHash {
        crate::hash::hash160(&self.to_xy_bytes())
    }

    /// Verify a raw `r || s` signature over a 32-byte prehashed digest.
    pub fn verify_prehash(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        self.0.verify_prehash(digest, &sig).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn public_key_xy_round_trips() {
        let kp = KeyPair::generate();
        let pk = kp.public_key();
        let bytes = pk.to_xy_bytes();
        let back = PublicKey::from_xy_bytes(&bytes).unwrap();
        assert_eq!(pk, back);
    }

    #[test]
    fn secret_bytes_round_trip_through_key_pair() {
        let kp = KeyPair::generate();
        let bytes = kp.secret_bytes();
        let restored = KeyPair::from_secret_bytes(&bytes).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let kp = KeyPair::generate();
        let digest = sha256(b"trimmed-copy preimage bytes");
        let sig = kp.sign_prehash(&digest).unwrap();
        assert!(kp.public_key().verify_prehash(&digest, &sig));
    }

    #[test]
    fn verification_fails_for_a_different_key() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = sha256(b"some message");
        let sig = signer.sign_prehash(&digest).unwrap();
        assert!(!other.public_key().verify_prehash(&digest, &sig));
    }

    #[test]
    fn mutating_the_digest_invalidates_the_signature() {
        let kp = KeyPair::generate();
        let digest = sha256(b"original message");
        let sig = kp.sign_prehash(&digest).unwrap();
        let mut tampered = digest;
        tampered[0] ^= 0xff;
        assert!(!kp.public_key().verify_prehash(&tampered, &sig));
    }

    #[test]
    fn mutating_any_signature_byte_invalidates_it() {
        let kp = KeyPair::generate();
        let digest = sha256(b"payload");
        let mut sig = kp.sign_prehash(&digest).unwrap();
        sig[10] ^= 0x01;
        assert!(!kp.public_key().verify_prehash(&digest, &sig));
    }

    #[test]
    fn pub_key_hash_is_20_bytes() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public_key().pub_key_hash().as_bytes().len(), 20);
    }
}
