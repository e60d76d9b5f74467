//! Fixed-width content addresses.
//!
//! An `Address` is the SHA-256 digest of a node's serialized bytes. It is
//! the canonical identity of every immutable object in a cairn tree: leaf
//! blobs, interior address maps, and roots. Addresses are
//! position-independent, so node-store writes need no ordering.
//!
//! ## String form
//!
//! Lowercase hex (64 characters). This is what appears in logs and APIs.
//!
//! ## Binary form
//!
//! The raw 32 digest bytes, used inline in interior node layouts.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Width of an address in bytes (SHA-256 digest size).
pub const ADDRESS_SIZE: usize = 32;

/// Content address of a stored node.
///
/// Total order is byte order, which makes addresses usable as map keys and
/// gives a deterministic iteration order in tests.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Compute the address of a byte blob.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.into())
    }

    /// Wrap raw digest bytes as an address.
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse an address from a byte slice.
    ///
    /// Returns an error unless the slice is exactly `ADDRESS_SIZE` bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::storage(format!("invalid address length: {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Borrow the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Lowercase hex form (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Re-hash `bytes` and check that the digest matches this address.
    ///
    /// Use this when accepting nodes from untrusted sources.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix keeps log lines readable; full form is Display.
        write!(f, "Address({}..)", &self.to_hex()[..8])
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::storage(format!("invalid address: {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for Address {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        use serde::Deserialize as _;
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Address::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
