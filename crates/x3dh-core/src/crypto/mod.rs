//! Cryptographic building blocks for the key agreement
//!
//! This module provides:
//! - `keys`: opaque private/public keys, key pairs and the shared secret
//! - `curve`: the `Curve` capability and its X25519 implementation
//! - `kdf`: HKDF-based derivation of the shared secret
//! - `bundle`: the `PreKeyBundle` capability and an Ed25519-signed bundle
//! - `x3dh`: the initiator and responder derivations

pub mod bundle;
pub mod curve;
pub mod kdf;
pub mod keys;
pub mod x3dh;

pub use bundle::{
    IdentityPublicKey, OneTimePreKeyPublic, PreKeyBundle, SignedBundle, SignedPreKeyPublic,
    SigningIdentity,
};
pub use curve::{Curve, Curve25519, CURVE25519_PREFIX};
pub use kdf::derive_shared_secret;
pub use keys::{DhPair, KeyPair, PrivateKey, PublicKey, SharedSecret, KEY_SIZE};
pub use x3dh::{InitializedProtocol, ProtocolInitialisation, X3dh};
