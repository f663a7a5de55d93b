//! Key derivation for the agreement
//!
//! HKDF extract-then-expand with:
//! - salt: 32 zero bytes
//! - input keying material: curve prefix ‖ concatenated DH outputs
//! - info: the protocol name
//!
//! The hash is a type parameter so callers can pick it at engine
//! construction; [`sha2::Sha256`] is the usual choice.

use hkdf::hmac::digest::{core_api::BlockSizeUser, Digest};
use hkdf::SimpleHkdf;
use zeroize::{Zeroize, Zeroizing};

use super::keys::{SharedSecret, SHARED_SECRET_SIZE};
use crate::error::Result;

/// HKDF salt: a fixed all-zero block, so derivation depends on no prior state
pub const KDF_SALT: [u8; 32] = [0u8; 32];

/// Derive the shared secret from concatenated DH outputs
pub fn derive_shared_secret<H>(prefix: &[u8], key_material: &[u8], info: &[u8]) -> Result<SharedSecret>
where
    H: Digest + BlockSizeUser + Clone,
{
    let ikm = Zeroizing::new(concat_keys(&[prefix, key_material]));
    let hkdf = SimpleHkdf::<H>::new(Some(&KDF_SALT[..]), &ikm);

    let mut okm = [0u8; SHARED_SECRET_SIZE];
    hkdf.expand(info, &mut okm)?;

    let secret = SharedSecret::from_bytes(okm);
    okm.zeroize();
    Ok(secret)
}

/// Concatenate multiple byte slices for use in the KDF
pub fn concat_keys(keys: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = keys.iter().map(|k| k.len()).sum();
    let mut result = Vec::with_capacity(total_len);
    for key in keys {
        result.extend_from_slice(key);
    }
    result
}
