//! x3dh core - asynchronous key agreement
//!
//! Two parties agree on a 32-byte secret without an interactive round
//! trip. The initiator derives it from the responder's published pre-key
//! bundle; the responder re-derives it later from the initiator's first
//! message.
//!
//! - Pluggable curve ([`Curve`]) with an X25519 implementation
//! - HKDF derivation over a configurable hash
//! - Ed25519-signed pre-key bundles
//! - Responder-side pre-key bookkeeping
//!
//! ```no_run
//! use x3dh_core::{Curve, Curve25519, PreKeyStore, InitialMessage, X3dh};
//!
//! # fn main() -> x3dh_core::Result<()> {
//! let curve = Curve25519::from_os_rng();
//! let mut bob_keys = PreKeyStore::generate(&curve, &mut rand::rngs::OsRng, 10)?;
//! let bundle = bob_keys.bundle()?;
//!
//! let alice = X3dh::<_>::new(&curve, "my-app", curve.generate_key_pair()?);
//! let init = alice.calculate_secret(&bundle)?;
//! let message = InitialMessage::for_bundle(alice.identity_key(), &init, &bundle)?;
//!
//! let bob = X3dh::<_>::new(&curve, "my-app", bob_keys.identity().key_pair().clone());
//! let resolved = bob_keys.resolve(&message)?;
//! let secret = bob.secret_from_remote(&resolved.initialisation())?;
//! assert_eq!(secret, init.shared_secret);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;

pub use config::{ProtocolConfig, ProtocolConfigBuilder};
pub use crypto::{
    Curve, Curve25519, IdentityPublicKey, InitializedProtocol, KeyPair, PreKeyBundle, PrivateKey,
    ProtocolInitialisation, PublicKey, SharedSecret, SignedBundle, SigningIdentity, X3dh,
};
pub use error::{Error, Result};
pub use protocol::{InitialMessage, PreKeyStore};
