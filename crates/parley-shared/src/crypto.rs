//! Password hashing.
//!
//! The account store takes the hasher as a value, so swapping the algorithm
//! is a single-point change. [`SaltedBlake3`] is the reference
//! implementation: a random salt plus one BLAKE3 derive-key pass. It is NOT
//! memory-hard and must be replaced (e.g. with Argon2id) before real
//! deployment.

use rand::RngCore;

use crate::constants::KDF_CONTEXT_PASSWORD;

/// Bytes of random salt stored per password.
const SALT_SIZE: usize = 16;

pub trait PasswordHasher: Send + Sync {
    /// Produce a self-contained stored form (salt included).
    fn hash(&self, password: &str) -> String;

    /// Check `password` against a previously stored form.
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Reference hasher: `hex(salt)$hex(blake3_derive_key(salt || password))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaltedBlake3;

impl SaltedBlake3 {
    fn digest(salt: &[u8], password: &str) -> String {
        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PASSWORD);
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

impl PasswordHasher for SaltedBlake3 {
    fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        format!("{}${}", hex::encode(salt), Self::digest(&salt, password))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt_hex, digest)) = stored.split_once('$') else {
            return false;
        };
        let Ok(salt) = hex::decode(salt_hex) else {
            return false;
        };
        Self::digest(&salt, password) == digest
    }
}
