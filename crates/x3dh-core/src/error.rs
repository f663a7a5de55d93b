//! Error types for the x3dh key agreement

use thiserror::Error;

/// Core error type for key agreement operations
#[derive(Error, Debug)]
pub enum Error {
    /// The remote bundle's signed pre-key signature did not verify
    #[error("the signature of the received pre-key bundle is invalid")]
    InvalidSignature,

    /// The signature check could not be carried out at all
    #[error("Pre-key signature could not be checked: {0}")]
    SignatureCheck(String),

    /// The injected entropy source could not supply the requested bytes
    #[error("Entropy source failed: {0}")]
    Entropy(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// The configured policy requires a one-time pre-key but the bundle had none
    #[error("Pre-key bundle carries no one-time pre-key")]
    MissingOneTimePreKey,

    #[error("Unknown signed pre-key: {0}")]
    UnknownSignedPreKey(u32),

    #[error("Unknown or already consumed one-time pre-key: {0}")]
    UnknownOneTimePreKey(u32),

    /// Only retired signed pre-keys can be removed
    #[error("Signed pre-key {0} is still current")]
    CurrentSignedPreKey(u32),

    #[error("Pre-key ids exhausted")]
    PreKeyIdsExhausted,

    #[error("Invalid initial message: {0}")]
    InvalidMessage(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rand_core::Error> for Error {
    fn from(e: rand_core::Error) -> Self {
        Error::Entropy(e.to_string())
    }
}

impl From<hkdf::InvalidLength> for Error {
    fn from(e: hkdf::InvalidLength) -> Self {
        Error::KeyDerivation(e.to_string())
    }
}

/// Result type for key agreement operations
pub type Result<T> = std::result::Result<T, Error>;
