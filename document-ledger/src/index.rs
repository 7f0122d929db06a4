//! Enumeration Index
//!
//! Append-only list of every hash ever issued, in acceptance order. Entries
//! live in the `index` column family keyed by their big-endian position, so
//! a forward RocksDB iteration yields insertion order. The index is written
//! in the same `WriteBatch` as the document record it points at and is never
//! pruned, not even on revocation.

use crate::types::DocumentHash;
use crate::{Error, Result};

/// Key for the entry at `position`
pub fn entry_key(position: u64) -> [u8; 8] {
    position.to_be_bytes()
}

/// Decode an index entry, checking that it sits where it claims to
pub fn decode_entry(expected: u64, key: &[u8], value: &[u8]) -> Result<DocumentHash> {
    let position: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::Corruption(format!("index key has {} bytes", key.len())))?;

    if u64::from_be_bytes(position) != expected {
        return Err(Error::Corruption(format!(
            "index gap: expected position {}, found {}",
            expected,
            u64::from_be_bytes(position)
        )));
    }

    let hash: [u8; 32] = value
        .try_into()
        .map_err(|_| Error::Corruption(format!("index value has {} bytes", value.len())))?;

    Ok(DocumentHash::from_bytes(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_sort_in_position_order() {
        let mut keys: Vec<[u8; 8]> = [300u64, 2, 256, 1].iter().map(|p| entry_key(*p)).collect();
        keys.sort();
        let positions: Vec<u64> = keys.iter().map(|k| u64::from_be_bytes(*k)).collect();
        assert_eq!(positions, vec![1, 2, 256, 300]);
    }

    #[test]
    fn test_decode_entry() {
        let hash = DocumentHash::from_bytes([9; 32]);
        let decoded = decode_entry(4, &entry_key(4), hash.as_bytes()).unwrap();
        assert_eq!(decoded, hash);
    }

    #[test]
    fn test_decode_entry_detects_gap() {
        let hash = DocumentHash::from_bytes([9; 32]);
        let err = decode_entry(3, &entry_key(4), hash.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_decode_entry_rejects_short_value() {
        let err = decode_entry(0, &entry_key(0), &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
