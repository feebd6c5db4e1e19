//! Blake3 hashing utilities for the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named alias for a 32-byte(u8) array, used to represent a 256-bit hash.
pub type H256 = [u8; 32];

/// Number of hex characters in a rendered hash.
pub const HEX_LEN: usize = 64;

/// A 256-bit digest with hex formatting.
///
/// The all-zero value doubles as the "nothing here" sentinel: the Merkle root
/// of an empty transaction list and the previous hash of the genesis block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub H256);

impl Hash {
    /// The zero hash (all zeros).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a new Hash from raw bytes.
    pub fn from_bytes(bytes: H256) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &H256 {
        &self.0
    }

    /// Whether this is the zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Convert to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Count the leading `'0'` characters of the hex rendering.
    pub fn leading_zero_nibbles(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// Whether the hex rendering starts with `difficulty` zero characters.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zero_nibbles() >= difficulty
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<H256> for Hash {
    fn from(bytes: H256) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Hash arbitrary data using Blake3.
pub fn hash(data: &[u8]) -> Hash {
    Hash(blake3::hash(data).into())
}

/// Hash multiple pieces of data by concatenating them.
pub fn hash_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    Hash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash(b"hello world"), hash(b"hello world"));
        assert_ne!(hash(b"hello"), hash(b"world"));
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = hash(b"test data");
        let hex_str = h.to_hex();
        assert_eq!(hex_str.len(), HEX_LEN);
        assert_eq!(Hash::from_hex(&hex_str).unwrap(), h);
        assert_eq!(Hash::from_hex(&h.to_string()).unwrap(), h);
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_hash_display() {
        let display = format!("{}", hash(b"test"));
        assert!(display.starts_with("0x"));
        assert_eq!(display.len(), 2 + HEX_LEN);
    }

    #[test]
    fn test_hash_concat() {
        assert_eq!(hash_concat(&[b"hello", b"world"]), hash(b"helloworld"));
    }

    #[test]
    fn test_zero_hash() {
        assert!(Hash::ZERO.is_zero());
        assert!(!hash(b"x").is_zero());
        assert_eq!(Hash::ZERO.leading_zero_nibbles(), HEX_LEN as u32);
    }

    #[test]
    fn test_leading_zero_nibbles_matches_hex() {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[1] = 0x0a;
        let h = Hash(bytes);
        assert!(h.to_hex().starts_with("000a"));
        assert_eq!(h.leading_zero_nibbles(), 3);
        assert!(h.meets_difficulty(3));
        assert!(!h.meets_difficulty(4));

        for i in 0..64u32 {
            let h = hash(&i.to_le_bytes());
            let expected = h.to_hex().chars().take_while(|c| *c == '0').count() as u32;
            assert_eq!(h.leading_zero_nibbles(), expected);
        }
    }

    #[test]
    fn test_difficulty_zero_always_met() {
        assert!(hash(b"anything").meets_difficulty(0));
        assert!(!Hash([0xff; 32]).meets_difficulty(65));
    }
}
