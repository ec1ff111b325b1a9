//! # Identities and Token Identifiers
//!
//! Every party, escrow and token in the engine is named by a 20-byte
//! [`Address`]. Tokens reuse the same type ([`TokenId`]) so a balance entry
//! is simply a pair of addresses. The all-zero address means "unset" and is
//! rejected wherever a real identity is required.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::ADDRESS_LENGTH;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte identity for a holder, an escrow or a token.
///
/// Serializes as a `0x`-prefixed hex string so that addresses can key JSON
/// objects directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

/// Token identifiers share the address space.
pub type TokenId = Address;

/// Sentinel token id for the native asset.
pub const NATIVE_TOKEN: TokenId = Address([0xEE; ADDRESS_LENGTH]);

impl Address {
    /// The unset address.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Creates an address from its raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Derives a deterministic address from a human-readable label.
    ///
    /// Computed as the first 20 bytes of `BLAKE3(label)`. Used by the
    /// scenario runner and by tests so that "alice" is always the same
    /// identity.
    pub fn from_label(label: &str) -> Self {
        Self::derive(&[label.as_bytes()])
    }

    /// Derives an address from a sequence of byte segments.
    ///
    /// Segments are separated by a `0x00` byte so that adjacent fields
    /// cannot be confused with each other.
    pub fn derive(segments: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                hasher.update(&[0x00]);
            }
            hasher.update(segment);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Returns `true` if this is the zero address.
    pub fn is_unset(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Returns `true` if this is the native-asset sentinel.
    pub fn is_native(&self) -> bool {
        *self == NATIVE_TOKEN
    }

    /// Returns the `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a hex address, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}…)", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_deterministic() {
        assert_eq!(Address::from_label("alice"), Address::from_label("alice"));
        assert_ne!(Address::from_label("alice"), Address::from_label("bob"));
    }

    #[test]
    fn zero_is_unset() {
        assert!(Address::ZERO.is_unset());
        assert!(!Address::from_label("alice").is_unset());
        assert!(!NATIVE_TOKEN.is_unset());
        assert!(NATIVE_TOKEN.is_native());
    }

    #[test]
    fn hex_roundtrip_accepts_prefix() {
        let addr = Address::from_label("carol");
        let hex = addr.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(Address::from_hex(&hex).unwrap(), addr);
        assert_eq!(Address::from_hex(&hex[2..]).unwrap(), addr);
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(Address::from_hex("0xdeadbeef").is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let addr = Address::from_label("dave");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn derive_separates_segments() {
        let a = Address::derive(&[b"ab".as_slice(), b"c".as_slice()]);
        let b = Address::derive(&[b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(a, b);
    }
}
