//! Argon2id key derivation for password-protected containers.

use crate::config::argon2_params;
use crate::crypto::key::{Key, KEY_SIZE};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

/// Key derivation using Argon2id.
#[derive(Debug, Clone)]
pub struct KeyDerivation {
    salt: [u8; argon2_params::SALT_LENGTH],
}

impl KeyDerivation {
    /// Create a new KDF with a random salt.
    pub fn new() -> Self {
        let mut salt = [0u8; argon2_params::SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self { salt }
    }

    /// Create a KDF from an existing salt (for re-opening a container).
    pub fn from_salt(salt: [u8; argon2_params::SALT_LENGTH]) -> Self {
        Self { salt }
    }

    /// Create a KDF from the hex salt recorded in a container header.
    pub fn from_hex_salt(salt: &str) -> Result<Self> {
        let raw = hex::decode(salt)
            .map_err(|e| Error::KeyDerivation(format!("Invalid salt encoding: {}", e)))?;
        let salt: [u8; argon2_params::SALT_LENGTH] = raw
            .try_into()
            .map_err(|_| Error::KeyDerivation("Invalid salt length".to_string()))?;
        Ok(Self::from_salt(salt))
    }

    /// Get the salt for storage.
    pub fn salt(&self) -> &[u8; argon2_params::SALT_LENGTH] {
        &self.salt
    }

    /// Derive a container key from a password.
    ///
    /// Uses Argon2id with the following parameters:
    /// - Memory: 64 MB
    /// - Iterations: 3
    /// - Parallelism: 4
    pub fn derive_key(&self, password: &str) -> Result<Key> {
        let params = Params::new(
            argon2_params::MEMORY_COST,
            argon2_params::TIME_COST,
            argon2_params::PARALLELISM,
            Some(argon2_params::OUTPUT_LENGTH),
        )
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(password.as_bytes(), &self.salt, &mut key)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?;

        Ok(Key::with_salt(key, self.salt))
    }
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self::new()
    }
}
