//! Curve abstraction used by the key agreement
//!
//! The engine only needs three things from a curve: a DH function, a
//! constant domain-separation prefix, and key-pair generation. [`Curve25519`]
//! is the one implementation provided here.

use std::sync::Mutex;

use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::keys::{DhPair, KeyPair, PrivateKey, PublicKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Domain-separation prefix for Curve25519: 32 bytes of `0xFF`
pub const CURVE25519_PREFIX: [u8; 32] = [0xFF; 32];

/// Diffie-Hellman capability over a single curve
pub trait Curve {
    /// Scalar multiplication of `pair.private_key` with `pair.public_key`.
    ///
    /// Deterministic and commutative across matching pairs:
    /// `dh(a, B) == dh(b, A)`. There is no failure path; a malformed or
    /// low-order public key yields a low-order (possibly all-zero) output
    /// rather than an error.
    fn key_exchange(&self, pair: DhPair<'_>) -> [u8; KEY_SIZE];

    /// Constant prefix prepended to the KDF input so that secrets derived
    /// on different curves never collide.
    fn prefix(&self) -> &[u8];

    /// Create a fresh key pair from the curve's entropy source.
    ///
    /// The only failure is the entropy source running dry.
    fn generate_key_pair(&self) -> Result<KeyPair>;
}

impl<C: Curve + ?Sized> Curve for &C {
    fn key_exchange(&self, pair: DhPair<'_>) -> [u8; KEY_SIZE] {
        (**self).key_exchange(pair)
    }

    fn prefix(&self) -> &[u8] {
        (**self).prefix()
    }

    fn generate_key_pair(&self) -> Result<KeyPair> {
        (**self).generate_key_pair()
    }
}

/// X25519 over Curve25519 with an injected entropy source
///
/// The source sits behind a mutex so one curve can serve concurrent
/// initiators.
pub struct Curve25519<R> {
    rng: Mutex<R>,
}

impl<R: RngCore + CryptoRng> Curve25519<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Return the entropy source, e.g. to inspect a test stub
    pub fn into_inner(self) -> R {
        match self.rng.into_inner() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn fill_scalar(&self, scalar: &mut [u8; KEY_SIZE]) -> Result<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Entropy("entropy source lock poisoned".into()))?;
        rng.try_fill_bytes(scalar)?;
        Ok(())
    }
}

impl Curve25519<rand::rngs::OsRng> {
    /// Curve backed by the operating system's randomness
    pub fn from_os_rng() -> Self {
        Self::new(rand::rngs::OsRng)
    }
}

/// Apply the X25519 scalar clamping in place
pub fn clamp_scalar(scalar: &mut [u8; KEY_SIZE]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}

impl<R: RngCore + CryptoRng> Curve for Curve25519<R> {
    fn key_exchange(&self, pair: DhPair<'_>) -> [u8; KEY_SIZE] {
        let secret = StaticSecret::from(*pair.private_key.as_bytes());
        let public = X25519PublicKey::from(*pair.public_key.as_bytes());
        secret.diffie_hellman(&public).to_bytes()
    }

    fn prefix(&self) -> &[u8] {
        &CURVE25519_PREFIX
    }

    fn generate_key_pair(&self) -> Result<KeyPair> {
        let mut scalar = [0u8; KEY_SIZE];
        self.fill_scalar(&mut scalar)?;
        clamp_scalar(&mut scalar);

        let secret = StaticSecret::from(scalar);
        let public = X25519PublicKey::from(&secret);
        let private_key = PrivateKey::from_bytes(scalar);
        scalar.zeroize();

        Ok(KeyPair::new(private_key, PublicKey::from(public.to_bytes())))
    }
}
