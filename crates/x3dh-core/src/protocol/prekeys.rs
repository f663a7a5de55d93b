//! Responder-side pre-key material
//!
//! [`PreKeyStore`] keeps the responder's identity, signed pre-keys and
//! one-time pre-keys in memory, publishes bundles, and turns an
//! [`InitialMessage`] back into the private keys it names. A one-time
//! pre-key is removed the moment a message consumes it.
//!
//! The store is serde-serializable so callers can persist it however they
//! like; it does no I/O itself.

use std::collections::BTreeMap;

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use super::message::InitialMessage;
use crate::crypto::bundle::{
    base64_vec, OneTimePreKeyPublic, SignedBundle, SignedPreKeyPublic, SigningIdentity,
};
use crate::crypto::curve::Curve;
use crate::crypto::keys::{KeyPair, PrivateKey};
use crate::crypto::x3dh::ProtocolInitialisation;
use crate::error::{Error, Result};

/// A signed pre-key with its signature
#[derive(Clone, Serialize, Deserialize)]
pub struct SignedPreKey {
    pub id: u32,
    key_pair: KeyPair,
    #[serde(with = "base64_vec")]
    signature: Vec<u8>,
}

impl SignedPreKey {
    /// Generate a new signed pre-key
    pub fn generate<C: Curve + ?Sized>(id: u32, curve: &C, identity: &SigningIdentity) -> Result<Self> {
        let key_pair = curve.generate_key_pair()?;
        let signature = identity.sign_pre_key(&key_pair.public_key());
        Ok(Self {
            id,
            key_pair,
            signature,
        })
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Get the public pre-key
    pub fn public_key(&self) -> SignedPreKeyPublic {
        SignedPreKeyPublic {
            id: self.id,
            public_key: self.key_pair.public_key(),
            signature: self.signature.clone(),
        }
    }
}

/// Private pre-keys picked out for one initial message
///
/// Owns the consumed one-time pre-key until the derivation is done.
pub struct ResolvedPreKeys<'a> {
    message: &'a InitialMessage,
    signed_pre_key: &'a PrivateKey,
    one_time_pre_key: Option<KeyPair>,
}

impl ResolvedPreKeys<'_> {
    /// Responder input for [`X3dh::secret_from_remote`]
    ///
    /// [`X3dh::secret_from_remote`]: crate::crypto::x3dh::X3dh::secret_from_remote
    pub fn initialisation(&self) -> ProtocolInitialisation<'_> {
        ProtocolInitialisation {
            remote_identity_key: self.message.identity_key,
            remote_ephemeral_key: self.message.ephemeral_key,
            my_one_time_pre_key: self.one_time_pre_key.as_ref().map(|k| k.private_key()),
            my_signed_pre_key: self.signed_pre_key,
        }
    }
}

/// In-memory pre-key material of a responder
#[derive(Clone, Serialize, Deserialize)]
pub struct PreKeyStore {
    identity: SigningIdentity,
    current_signed_pre_key: u32,
    signed_pre_keys: BTreeMap<u32, SignedPreKey>,
    one_time_pre_keys: BTreeMap<u32, KeyPair>,
    next_id: u32,
}

impl PreKeyStore {
    /// Generate an identity, one signed pre-key and `one_time_count`
    /// one-time pre-keys
    pub fn generate<C, R>(curve: &C, rng: &mut R, one_time_count: u32) -> Result<Self>
    where
        C: Curve + ?Sized,
        R: RngCore + CryptoRng,
    {
        let identity = SigningIdentity::generate(curve, rng)?;
        let signed_pre_key = SignedPreKey::generate(1, curve, &identity)?;

        let mut store = Self {
            identity,
            current_signed_pre_key: signed_pre_key.id,
            signed_pre_keys: BTreeMap::from([(signed_pre_key.id, signed_pre_key)]),
            one_time_pre_keys: BTreeMap::new(),
            next_id: 2,
        };
        store.add_one_time_pre_keys(curve, one_time_count)?;
        Ok(store)
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    pub fn signed_pre_key(&self) -> Result<&SignedPreKey> {
        self.signed_pre_keys
            .get(&self.current_signed_pre_key)
            .ok_or(Error::UnknownSignedPreKey(self.current_signed_pre_key))
    }

    /// Replace the current signed pre-key; older ones keep resolving so
    /// messages in flight still work. Returns the new id.
    pub fn rotate_signed_pre_key<C: Curve + ?Sized>(&mut self, curve: &C) -> Result<u32> {
        let id = self.allocate_id()?;
        let signed_pre_key = SignedPreKey::generate(id, curve, &self.identity)?;
        self.signed_pre_keys.insert(id, signed_pre_key);
        self.current_signed_pre_key = id;
        tracing::debug!(id, "x3dh: rotated signed pre-key");
        Ok(id)
    }

    /// Forget a retired signed pre-key
    pub fn remove_signed_pre_key(&mut self, id: u32) -> Result<()> {
        if id == self.current_signed_pre_key {
            return Err(Error::CurrentSignedPreKey(id));
        }
        self.signed_pre_keys
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::UnknownSignedPreKey(id))
    }

    /// Generate `count` more one-time pre-keys and return their ids
    pub fn add_one_time_pre_keys<C: Curve + ?Sized>(&mut self, curve: &C, count: u32) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for _ in 0..count {
            let id = self.allocate_id()?;
            self.one_time_pre_keys.insert(id, curve.generate_key_pair()?);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Number of remaining one-time pre-keys
    pub fn remaining_one_time_pre_keys(&self) -> usize {
        self.one_time_pre_keys.len()
    }

    /// Bundle offering the lowest-numbered unused one-time pre-key, or none
    /// if they have run out
    pub fn bundle(&self) -> Result<SignedBundle> {
        let first = self.one_time_pre_keys.keys().next().copied();
        self.bundle_with(first)
    }

    /// Bundle offering a specific one-time pre-key (or none)
    pub fn bundle_with(&self, one_time_pre_key_id: Option<u32>) -> Result<SignedBundle> {
        let one_time_pre_key = match one_time_pre_key_id {
            Some(id) => {
                let pair = self
                    .one_time_pre_keys
                    .get(&id)
                    .ok_or(Error::UnknownOneTimePreKey(id))?;
                Some(OneTimePreKeyPublic {
                    id,
                    public_key: pair.public_key(),
                })
            }
            None => None,
        };

        Ok(SignedBundle {
            identity_key: self.identity.key_pair().public_key(),
            verifying_key: self.identity.verifying_key(),
            signed_pre_key: self.signed_pre_key()?.public_key(),
            one_time_pre_key,
        })
    }

    /// Look up the private keys an initial message names
    ///
    /// The named one-time pre-key is removed from the store, so a second
    /// message naming it fails with [`Error::UnknownOneTimePreKey`]. Nothing
    /// is consumed if the signed pre-key is unknown.
    pub fn resolve<'a>(&'a mut self, message: &'a InitialMessage) -> Result<ResolvedPreKeys<'a>> {
        if !self.signed_pre_keys.contains_key(&message.signed_pre_key_id) {
            return Err(Error::UnknownSignedPreKey(message.signed_pre_key_id));
        }

        let one_time_pre_key = match message.one_time_pre_key_id {
            Some(id) => {
                let pair = self
                    .one_time_pre_keys
                    .remove(&id)
                    .ok_or(Error::UnknownOneTimePreKey(id))?;
                tracing::debug!(id, "x3dh: consumed one-time pre-key");
                Some(pair)
            }
            None => None,
        };

        let signed_pre_key = self
            .signed_pre_keys
            .get(&message.signed_pre_key_id)
            .ok_or(Error::UnknownSignedPreKey(message.signed_pre_key_id))?;

        Ok(ResolvedPreKeys {
            message,
            signed_pre_key: signed_pre_key.key_pair.private_key(),
            one_time_pre_key,
        })
    }

    fn allocate_id(&mut self) -> Result<u32> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(Error::PreKeyIdsExhausted)?;
        Ok(id)
    }
}
