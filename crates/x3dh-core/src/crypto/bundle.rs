//! Pre-key bundles
//!
//! The engine only reads bundles through the [`PreKeyBundle`] trait and
//! trusts its signature check unconditionally. [`SignedBundle`] is a ready
//! made implementation that signs the signed pre-key with Ed25519 using a
//! [`SigningIdentity`].
//!
//! A valid signature only proves the pre-key was signed by the bundle's own
//! verifying key. Authenticity comes from comparing the bundle's
//! [`IdentityPublicKey::fingerprint`], which covers both identity halves,
//! against one obtained out of band.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::curve::Curve;
use super::keys::{base64_key, KeyPair, PublicKey};
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Published material of the party we want to talk to
///
/// Implemented by the caller; the engine never constructs one.
pub trait PreKeyBundle {
    /// Long-term DH identity key
    fn identity_key(&self) -> PublicKey;

    fn signed_pre_key(&self) -> PublicKey;

    fn pre_key_signature(&self) -> &[u8];

    /// Single-use pre-key, if the publisher had one left
    fn one_time_pre_key(&self) -> Option<PublicKey>;

    /// Check the signature over the signed pre-key.
    ///
    /// `Ok(false)` means the signature is present but does not verify and
    /// makes the initiator abort with [`Error::InvalidSignature`]. `Err`
    /// means the check could not be carried out (e.g. a malformed verifying
    /// key) and is passed through to the caller as is.
    fn valid_signature(&self) -> Result<bool>;
}

impl<B: PreKeyBundle + ?Sized> PreKeyBundle for &B {
    fn identity_key(&self) -> PublicKey {
        (**self).identity_key()
    }

    fn signed_pre_key(&self) -> PublicKey {
        (**self).signed_pre_key()
    }

    fn pre_key_signature(&self) -> &[u8] {
        (**self).pre_key_signature()
    }

    fn one_time_pre_key(&self) -> Option<PublicKey> {
        (**self).one_time_pre_key()
    }

    fn valid_signature(&self) -> Result<bool> {
        (**self).valid_signature()
    }
}

/// Long-term identity: an Ed25519 signing key plus the DH identity key pair
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "StoredIdentity", from = "StoredIdentity")]
pub struct SigningIdentity {
    signing_key: SigningKey,
    key_pair: KeyPair,
}

#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredIdentity {
    #[serde(with = "base64_key")]
    signing_key: [u8; 32],
    #[zeroize(skip)]
    key_pair: KeyPair,
}

impl From<SigningIdentity> for StoredIdentity {
    fn from(identity: SigningIdentity) -> Self {
        Self {
            signing_key: identity.signing_key.to_bytes(),
            key_pair: identity.key_pair,
        }
    }
}

impl From<StoredIdentity> for SigningIdentity {
    fn from(stored: StoredIdentity) -> Self {
        SigningIdentity::from_parts(&stored.signing_key, stored.key_pair.clone())
    }
}

impl SigningIdentity {
    /// Generate a new identity; the DH half comes from `curve`, the signing
    /// half from `rng`.
    pub fn generate<C, R>(curve: &C, rng: &mut R) -> Result<Self>
    where
        C: Curve + ?Sized,
        R: RngCore + CryptoRng,
    {
        let mut seed = [0u8; 32];
        rng.try_fill_bytes(&mut seed)?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();

        Ok(Self {
            signing_key,
            key_pair: curve.generate_key_pair()?,
        })
    }

    /// Rebuild from stored parts
    pub fn from_parts(signing_key_bytes: &[u8; 32], key_pair: KeyPair) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(signing_key_bytes),
            key_pair,
        }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Public half to publish and fingerprint
    pub fn public_identity(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            dh_key: self.key_pair.public_key(),
            verifying_key: self.verifying_key(),
        }
    }

    pub fn verifying_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Export signing key bytes (for secure storage)
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a pre-key's public bytes
    pub fn sign_pre_key(&self, pre_key: &PublicKey) -> Vec<u8> {
        self.signing_key.sign(pre_key.as_bytes()).to_bytes().to_vec()
    }
}

/// Public identity: the DH identity key bound to its Ed25519 verifying key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityPublicKey {
    pub dh_key: PublicKey,
    #[serde(with = "base64_key")]
    pub verifying_key: [u8; 32],
}

impl IdentityPublicKey {
    /// Generate a fingerprint for identity verification
    pub fn fingerprint(&self) -> String {
        use blake2::{Blake2s256, Digest};
        let mut hasher = Blake2s256::new();
        hasher.update(self.verifying_key);
        hasher.update(self.dh_key.as_bytes());
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}

/// Public portion of a signed pre-key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKeyPublic {
    pub id: u32,
    pub public_key: PublicKey,
    #[serde(with = "base64_vec")]
    pub signature: Vec<u8>,
}

/// Public portion of a one-time pre-key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimePreKeyPublic {
    pub id: u32,
    pub public_key: PublicKey,
}

/// Pre-key bundle whose signed pre-key is signed with Ed25519
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedBundle {
    pub identity_key: PublicKey,
    #[serde(with = "base64_key")]
    pub verifying_key: [u8; 32],
    pub signed_pre_key: SignedPreKeyPublic,
    pub one_time_pre_key: Option<OneTimePreKeyPublic>,
}

impl SignedBundle {
    /// The identity this bundle claims
    pub fn identity(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            dh_key: self.identity_key,
            verifying_key: self.verifying_key,
        }
    }

    /// Fingerprint over both identity keys; compare it before trusting the bundle
    pub fn fingerprint(&self) -> String {
        self.identity().fingerprint()
    }

    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key.id
    }

    pub fn one_time_pre_key_id(&self) -> Option<u32> {
        self.one_time_pre_key.map(|k| k.id)
    }
}

impl PreKeyBundle for SignedBundle {
    fn identity_key(&self) -> PublicKey {
        self.identity_key
    }

    fn signed_pre_key(&self) -> PublicKey {
        self.signed_pre_key.public_key
    }

    fn pre_key_signature(&self) -> &[u8] {
        &self.signed_pre_key.signature
    }

    fn one_time_pre_key(&self) -> Option<PublicKey> {
        self.one_time_pre_key.map(|k| k.public_key)
    }

    fn valid_signature(&self) -> Result<bool> {
        let verifying_key = VerifyingKey::from_bytes(&self.verifying_key)
            .map_err(|e| Error::SignatureCheck(e.to_string()))?;
        let signature = Signature::from_slice(&self.signed_pre_key.signature)
            .map_err(|e| Error::SignatureCheck(e.to_string()))?;

        Ok(verifying_key
            .verify_strict(self.signed_pre_key.public_key.as_bytes(), &signature)
            .is_ok())
    }
}

pub(crate) mod base64_vec {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}
