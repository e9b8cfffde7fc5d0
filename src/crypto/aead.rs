//! The AEAD service boundary consumed by the container codec.

use crate::crypto::cipher::Cipher;
use crate::crypto::key::Key;
use crate::error::Result;
use std::io::{Read, Write};

/// Authenticated encryption as seen by the container codec.
///
/// Implementations must fail with `Error::Integrity` whenever authentication
/// fails; the codec never inspects ciphertext itself.
pub trait AeadService: Send + Sync {
    /// Encrypt a whole payload in one pass.
    fn encrypt(&self, key: &Key, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a payload produced by `encrypt`.
    fn decrypt(&self, key: &Key, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Encrypt `reader` into `writer` without buffering the whole payload.
    fn encrypt_stream(&self, key: &Key, reader: &mut dyn Read, writer: &mut dyn Write)
        -> Result<u64>;

    /// Decrypt a stream produced by `encrypt_stream`.
    fn decrypt_stream(&self, key: &Key, reader: &mut dyn Read, writer: &mut dyn Write)
        -> Result<u64>;

    /// Name of this service (for logging).
    fn name(&self) -> &'static str;
}

/// AES-256-GCM service, with the STREAM construction for streamed payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aes256GcmAead;

impl AeadService for Aes256GcmAead {
    fn encrypt(&self, key: &Key, plaintext: &[u8]) -> Result<Vec<u8>> {
        Cipher::new(key.bytes()).encrypt(plaintext)
    }

    fn decrypt(&self, key: &Key, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Cipher::new(key.bytes()).decrypt(ciphertext)
    }

    fn encrypt_stream(
        &self,
        key: &Key,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> Result<u64> {
        Cipher::new(key.bytes()).encrypt_stream(reader, writer)
    }

    fn decrypt_stream(
        &self,
        key: &Key,
        reader: &mut dyn Read,
        writer: &mut dyn Write,
    ) -> Result<u64> {
        Cipher::new(key.bytes()).decrypt_stream(reader, writer)
    }

    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_service_roundtrip() {
        let key = Key::from_bytes([3u8; 32]);
        let aead = Aes256GcmAead;
        let sealed = aead.encrypt(&key, b"payload").unwrap();
        assert_eq!(aead.decrypt(&key, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_service_wrong_key() {
        let aead = Aes256GcmAead;
        let sealed = aead.encrypt(&Key::from_bytes([3u8; 32]), b"payload").unwrap();
        let result = aead.decrypt(&Key::from_bytes([4u8; 32]), &sealed);
        assert!(matches!(result, Err(Error::Integrity)));
    }
}
