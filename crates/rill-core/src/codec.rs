//! Canonical binary encoding.
//!
//! Every wire and on-disk type derives `bincode::Encode`/`Decode` and is
//! encoded with [`bincode::config::standard()`]: fixed-width little-endian
//! integers, no map types in the hot path, and no trailing-byte tolerance on
//! decode. Two values that are field-equal always encode to the same bytes.

use bincode::config::{self, Configuration, Fixint, LittleEndian};
use bincode::{Decode, Encode};

use crate::error::CoreError;

/// Little-endian, fixed-width integers, no trailing-byte tolerance — the
/// canonical configuration every wire/on-disk type is encoded with.
fn config() -> Configuration<LittleEndian, Fixint> {
    config::standard().with_fixed_int_encoding()
}

pub fn encode<T: Encode>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::encode_to_vec(value, config()).map_err(|e| CoreError::CodecError(e.to_string()))
}

pub fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, CoreError> {
    let (value, consumed) = bincode::decode_from_slice(bytes, config())
        .map_err(|e| CoreError::CodecError(e.to_string()))?;
    if consumed != bytes.len() {
        return Err(CoreError::CodecError(format!(
            "trailing bytes: consumed {consumed} of {}",
            bytes.len()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, PartialEq, Eq, Encode, Decode)]
    struct Sample {
        a: u64,
        b: Vec<u8>,
    }

    #[test]
    fn round_trips() {
        let s = Sample { a: 7, b: vec![1, 2, 3] };
        let bytes = encode(&s).unwrap();
        let back: Sample = decode(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let s = Sample { a: 1, b: vec![] };
        let mut bytes = encode(&s).unwrap();
        bytes.push(0xff);
        let result: Result<Sample, _> = decode(&bytes);
        assert!(result.is_err());
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn any_sample_round_trips(a in any::<u64>(), b in prop::collection::vec(any::<u8>(), 0..64)) {
            let s = Sample { a, b };
            let bytes = encode(&s).unwrap();
            let back: Sample = decode(&bytes).unwrap();
            prop_assert_eq!(s, back);
        }
    }
}
