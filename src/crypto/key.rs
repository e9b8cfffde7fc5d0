//! Container keys.

use crate::config::argon2_params;
use crate::error::{Error, Result};
use std::fmt;

/// Key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// A 256-bit container key, optionally tied to the Argon2id salt it came from.
///
/// The salt is not secret. When present it is written to the clear header of
/// every container packed with this key so the key can be re-derived later.
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
    salt: Option<[u8; argon2_params::SALT_LENGTH]>,
}

impl Key {
    /// Use raw key material directly.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes, salt: None }
    }

    /// Parse a hex-encoded 32-byte key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let raw = hex::decode(hex_key.trim())
            .map_err(|e| Error::KeyDerivation(format!("Invalid hex key: {}", e)))?;
        let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|raw: Vec<u8>| {
            Error::KeyDerivation(format!(
                "Key must be {} bytes, got {}",
                KEY_SIZE,
                raw.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub(crate) fn with_salt(bytes: [u8; KEY_SIZE], salt: [u8; argon2_params::SALT_LENGTH]) -> Self {
        Self {
            bytes,
            salt: Some(salt),
        }
    }

    /// Raw key bytes.
    pub fn bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Salt the key was derived with, if any.
    pub fn salt(&self) -> Option<&[u8; argon2_params::SALT_LENGTH]> {
        self.salt.as_ref()
    }

    /// Hex form of the salt, as stored in container headers.
    pub fn salt_hex(&self) -> Option<String> {
        self.salt.map(hex::encode)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("bytes", &"<redacted>")
            .field("salt", &self.salt_hex())
            .finish()
    }
}
