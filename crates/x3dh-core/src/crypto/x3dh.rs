//! Extended Triple Diffie-Hellman (X3DH) key agreement
//!
//! Lets two parties agree on a shared secret without a round trip. The
//! initiator works from the responder's published [`PreKeyBundle`]; the
//! responder later repeats the derivation from what the initiator's first
//! message reveals.
//!
//! ```text
//! initiator (A)                      responder (B)
//! DH1 = DH(IK_A, SPK_B)              DH1 = DH(SPK_B, IK_A)
//! DH2 = DH(EK_A, IK_B)               DH2 = DH(IK_B, EK_A)
//! DH3 = DH(EK_A, SPK_B)              DH3 = DH(SPK_B, EK_A)
//! DH4 = DH(EK_A, OPK_B)  (optional)  DH4 = DH(OPK_B, EK_A)  (optional)
//!
//! SK = HKDF(salt = 0^32, ikm = prefix || DH1 || DH2 || DH3 [|| DH4], info)
//! ```
//!
//! Term order is fixed. Both sides must also agree on whether DH4 is
//! present, otherwise they derive different secrets without any error.

use std::marker::PhantomData;

use hkdf::hmac::digest::{core_api::BlockSizeUser, Digest};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::bundle::PreKeyBundle;
use super::curve::Curve;
use super::kdf::{concat_keys, derive_shared_secret};
use super::keys::{DhPair, KeyPair, PrivateKey, PublicKey, SharedSecret, KEY_SIZE};
use crate::config::ProtocolConfig;
use crate::error::{Error, Result};

/// What the responder needs to repeat the derivation
///
/// The remote keys come from the initiator's message; the private keys are
/// the responder's own, looked up by the ids that message names.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolInitialisation<'a> {
    pub remote_identity_key: PublicKey,
    pub remote_ephemeral_key: PublicKey,
    pub my_one_time_pre_key: Option<&'a PrivateKey>,
    pub my_signed_pre_key: &'a PrivateKey,
}

/// Result of the initiator side
#[derive(Debug)]
pub struct InitializedProtocol {
    pub shared_secret: SharedSecret,
    /// One-time pre-key consumed from the bundle, if there was one
    pub used_one_time_pre_key: Option<PublicKey>,
    pub used_signed_pre_key: PublicKey,
    /// Ephemeral public key; must reach the responder
    pub ephemeral_key: PublicKey,
}

/// Key agreement engine for one party
///
/// Holds the party's long-term identity key pair. Both operations take
/// `&self` and keep no state between calls.
pub struct X3dh<C, H = Sha256> {
    curve: C,
    config: ProtocolConfig,
    identity: KeyPair,
    _hash: PhantomData<fn() -> H>,
}

impl<C, H> X3dh<C, H>
where
    C: Curve,
    H: Digest + BlockSizeUser + Clone,
{
    /// Create an engine with `info` as the protocol name (e.g. `"pangea"`)
    pub fn new(curve: C, info: impl Into<String>, identity: KeyPair) -> Self {
        Self {
            curve,
            config: ProtocolConfig::new(info),
            identity,
            _hash: PhantomData,
        }
    }

    /// Create an engine from a full configuration
    pub fn with_config(curve: C, config: ProtocolConfig, identity: KeyPair) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            curve,
            config,
            identity,
            _hash: PhantomData,
        })
    }

    pub fn identity_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    pub fn curve(&self) -> &C {
        &self.curve
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Generate a key pair on the engine's curve (e.g. fresh pre-keys)
    pub fn new_key_pair(&self) -> Result<KeyPair> {
        self.curve.generate_key_pair()
    }

    /// Initiator side: derive a secret from the responder's bundle
    ///
    /// Aborts with [`Error::InvalidSignature`] before touching any key
    /// material or drawing randomness if the bundle's signature is invalid.
    pub fn calculate_secret<B>(&self, bundle: &B) -> Result<InitializedProtocol>
    where
        B: PreKeyBundle + ?Sized,
    {
        if !bundle.valid_signature()? {
            return Err(Error::InvalidSignature);
        }

        let one_time_pre_key = bundle.one_time_pre_key();
        if one_time_pre_key.is_none() && self.config.require_one_time_pre_key {
            return Err(Error::MissingOneTimePreKey);
        }

        let remote_identity = bundle.identity_key();
        let signed_pre_key = bundle.signed_pre_key();

        let ephemeral = self.curve.generate_key_pair()?;

        let dh1 = self.dh(self.identity.private_key(), &signed_pre_key);
        let dh2 = self.dh(ephemeral.private_key(), &remote_identity);
        let dh3 = self.dh(ephemeral.private_key(), &signed_pre_key);
        let dh4 = one_time_pre_key.map(|otpk| self.dh(ephemeral.private_key(), &otpk));

        let shared_secret = self.kdf(&dh1, &dh2, &dh3, dh4.as_deref())?;

        tracing::debug!(
            remote = %remote_identity.fingerprint(),
            one_time_pre_key = dh4.is_some(),
            "x3dh: derived initiator secret"
        );

        Ok(InitializedProtocol {
            shared_secret,
            used_one_time_pre_key: one_time_pre_key,
            used_signed_pre_key: signed_pre_key,
            ephemeral_key: ephemeral.public_key(),
        })
    }

    /// Responder side: derive the secret from the initiator's first message
    ///
    /// Draws no randomness and checks no signatures. DH4 is included iff
    /// `my_one_time_pre_key` is set.
    pub fn secret_from_remote(&self, init: &ProtocolInitialisation<'_>) -> Result<SharedSecret> {
        let dh1 = self.dh(init.my_signed_pre_key, &init.remote_identity_key);
        let dh2 = self.dh(self.identity.private_key(), &init.remote_ephemeral_key);
        let dh3 = self.dh(init.my_signed_pre_key, &init.remote_ephemeral_key);
        let dh4 = init
            .my_one_time_pre_key
            .map(|otpk| self.dh(otpk, &init.remote_ephemeral_key));

        let shared_secret = self.kdf(&dh1, &dh2, &dh3, dh4.as_deref())?;

        tracing::debug!(
            remote = %init.remote_identity_key.fingerprint(),
            one_time_pre_key = dh4.is_some(),
            "x3dh: derived responder secret"
        );

        Ok(shared_secret)
    }

    fn dh(&self, private_key: &PrivateKey, public_key: &PublicKey) -> Zeroizing<[u8; KEY_SIZE]> {
        Zeroizing::new(self.curve.key_exchange(DhPair::new(private_key, public_key)))
    }

    fn kdf(
        &self,
        dh1: &[u8; KEY_SIZE],
        dh2: &[u8; KEY_SIZE],
        dh3: &[u8; KEY_SIZE],
        dh4: Option<&[u8; KEY_SIZE]>,
    ) -> Result<SharedSecret> {
        let mut terms: Vec<&[u8]> = vec![&dh1[..], &dh2[..], &dh3[..]];
        terms.extend(dh4.map(|dh| &dh[..]));

        tracing::trace!(dh_terms = terms.len(), "x3dh: deriving secret");

        let key_material = Zeroizing::new(concat_keys(&terms));
        derive_shared_secret::<H>(
            self.curve.prefix(),
            &key_material,
            self.config.info.as_bytes(),
        )
    }
}
