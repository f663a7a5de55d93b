//! Raw key material for the key agreement
//!
//! Keys are opaque 32-byte arrays. Nothing here checks curve membership;
//! that is left to the [`Curve`](super::curve::Curve) doing the arithmetic.
//!
//! - [`PrivateKey`]: secret scalar, zeroized on drop, never printed
//! - [`PublicKey`]: public point, freely copied
//! - [`KeyPair`]: an owned private/public pair belonging to one party
//! - [`DhPair`]: the input to a single DH, halves owned by different parties
//! - [`SharedSecret`]: the 32-byte agreement output

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of every private key, public key and shared secret in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the shared secret in bytes
pub const SHARED_SECRET_SIZE: usize = KEY_SIZE;

fn array_from_slice(bytes: &[u8]) -> Result<[u8; KEY_SIZE]> {
    bytes.try_into().map_err(|_| Error::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: bytes.len(),
    })
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Public half of a key pair
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "base64_key")] [u8; KEY_SIZE]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice that must be exactly [`KEY_SIZE`] bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        array_from_slice(bytes).map(Self)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_slice(&decode_base64(encoded)?)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Short identifier for display and logging
    pub fn fingerprint(&self) -> String {
        use blake2::{Blake2s256, Digest};
        let hash = Blake2s256::digest(self.0);
        hex::encode(&hash[..16])
    }
}

impl From<[u8; KEY_SIZE]> for PublicKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// Secret half of a key pair
///
/// Not `Copy`; cloning is explicit and every copy is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
pub struct PrivateKey(#[serde(with = "base64_key")] [u8; KEY_SIZE]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice that must be exactly [`KEY_SIZE`] bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        array_from_slice(bytes).map(Self)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut decoded = decode_base64(encoded)?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Raw scalar bytes (for DH and for secure storage by the caller)
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A party's own private key together with its public key
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Pair up existing key halves
    ///
    /// The halves are trusted to match; use [`Curve::generate_key_pair`]
    /// to create new ones.
    ///
    /// [`Curve::generate_key_pair`]: super::curve::Curve::generate_key_pair
    pub fn new(private_key: PrivateKey, public_key: PublicKey) -> Self {
        Self {
            private_key,
            public_key,
        }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Input to a single Diffie-Hellman operation
///
/// Unlike [`KeyPair`], the two halves belong to different parties: our
/// private key and the counterparty's public key.
#[derive(Clone, Copy, Debug)]
pub struct DhPair<'a> {
    pub private_key: &'a PrivateKey,
    pub public_key: &'a PublicKey,
}

impl<'a> DhPair<'a> {
    pub fn new(private_key: &'a PrivateKey, public_key: &'a PublicKey) -> Self {
        Self {
            private_key,
            public_key,
        }
    }
}

/// The 32-byte secret both parties agree on
///
/// Equality is constant time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SharedSecret {}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

// Keys travel as base64 strings in human-readable formats and as raw
// arrays otherwise.
pub(crate) mod base64_key {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::KEY_SIZE;

    pub fn serialize<S>(key: &[u8; KEY_SIZE], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(key))
        } else {
            serde::Serialize::serialize(key, serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; KEY_SIZE], D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(serde::de::Error::custom)?;
            bytes.try_into().map_err(|b: Vec<u8>| {
                serde::de::Error::custom(format!(
                    "invalid key length: expected {}, got {}",
                    KEY_SIZE,
                    b.len()
                ))
            })
        } else {
            <[u8; KEY_SIZE]>::deserialize(deserializer)
        }
    }
}
