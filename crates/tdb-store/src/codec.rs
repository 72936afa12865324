//! Canonical CBOR encoding for persisted table records.

use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::value::Value as CborValue;

/// Serialize a value into canonical CBOR bytes (sorted map keys, self-described).
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_cbor::Error> {
    // Round-tripping through `Value` sorts map keys deterministically.
    let canonical: CborValue = serde_cbor::value::to_value(value)?;
    let mut buf = Vec::with_capacity(64);
    let mut serializer = serde_cbor::ser::Serializer::new(&mut buf);
    serializer.self_describe()?;
    canonical.serialize(&mut serializer)?;
    Ok(buf)
}

pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_cbor::Error> {
    serde_cbor::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpaceEntry;
    use std::collections::HashMap;

    #[test]
    fn encoding_is_stable_across_insertion_order() {
        let keys = ["zeta", "alpha", "mid", "beta", "omega"];
        let a: HashMap<&str, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        let b: HashMap<&str, usize> = keys.iter().enumerate().rev().map(|(i, k)| (*k, i)).collect();
        assert_eq!(to_canonical_cbor(&a).unwrap(), to_canonical_cbor(&b).unwrap());
    }

    #[test]
    fn decodes_entry() {
        let entry = SpaceEntry::new("register", 7, 2);
        let bytes = to_canonical_cbor(&entry).unwrap();
        // self-describe tag 55799
        assert_eq!(&bytes[..3], &[0xd9, 0xd9, 0xf7]);
        let decoded: SpaceEntry = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, entry);
    }
}
