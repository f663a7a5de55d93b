//! The initiator's first message
//!
//! Carries everything the responder needs to repeat the derivation: the
//! initiator's identity and ephemeral keys and the ids of the pre-keys that
//! were consumed. The one-time pre-key id is what tells the responder
//! whether to include DH4.

use serde::{Deserialize, Serialize};

use crate::crypto::bundle::SignedBundle;
use crate::crypto::keys::PublicKey;
use crate::crypto::x3dh::InitializedProtocol;
use crate::error::{Error, Result};

/// Initial message sent from initiator to responder
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialMessage {
    /// Initiator's identity public key
    pub identity_key: PublicKey,
    /// Ephemeral public key used in this exchange
    pub ephemeral_key: PublicKey,
    /// ID of the signed pre-key used
    pub signed_pre_key_id: u32,
    /// ID of the one-time pre-key used (if any)
    pub one_time_pre_key_id: Option<u32>,
}

impl InitialMessage {
    /// Build a message from an initiator result and the ids the bundle
    /// published for the consumed keys.
    ///
    /// Fails if `one_time_pre_key_id` disagrees with whether a one-time
    /// pre-key was actually used.
    pub fn new(
        identity_key: PublicKey,
        protocol: &InitializedProtocol,
        signed_pre_key_id: u32,
        one_time_pre_key_id: Option<u32>,
    ) -> Result<Self> {
        match (protocol.used_one_time_pre_key, one_time_pre_key_id) {
            (Some(_), None) => {
                return Err(Error::InvalidMessage(
                    "one-time pre-key was used but no id was given".into(),
                ))
            }
            (None, Some(id)) => {
                return Err(Error::InvalidMessage(format!(
                    "one-time pre-key {} named but none was used",
                    id
                )))
            }
            _ => {}
        }

        Ok(Self {
            identity_key,
            ephemeral_key: protocol.ephemeral_key,
            signed_pre_key_id,
            one_time_pre_key_id,
        })
    }

    /// Build a message for a result derived from `bundle`
    pub fn for_bundle(
        identity_key: PublicKey,
        protocol: &InitializedProtocol,
        bundle: &SignedBundle,
    ) -> Result<Self> {
        if protocol.used_signed_pre_key != bundle.signed_pre_key.public_key {
            return Err(Error::InvalidMessage(
                "signed pre-key does not belong to this bundle".into(),
            ));
        }
        if protocol.used_one_time_pre_key != bundle.one_time_pre_key.map(|k| k.public_key) {
            return Err(Error::InvalidMessage(
                "one-time pre-key does not belong to this bundle".into(),
            ));
        }
        Self::new(
            identity_key,
            protocol,
            bundle.signed_pre_key_id(),
            bundle.one_time_pre_key_id(),
        )
    }

    /// Whether the responder must include the fourth DH term
    pub fn uses_one_time_pre_key(&self) -> bool {
        self.one_time_pre_key_id.is_some()
    }
}
