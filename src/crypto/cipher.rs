//! AES-256-GCM authenticated encryption, in one shot or as a chunked stream.

use crate::config::STREAM_CHUNK_SIZE;
use crate::crypto::key::KEY_SIZE;
use crate::error::{Error, Result};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::stream::{DecryptorBE32, EncryptorBE32};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use std::io::{self, Read, Write};

/// Nonce size for AES-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits).
const TAG_SIZE: usize = 16;

/// Nonce prefix of the STREAM construction (96 bits minus the 5-byte counter).
const STREAM_NONCE_SIZE: usize = 7;

/// AES-256-GCM cipher wrapper.
pub struct Cipher {
    cipher: Aes256Gcm,
}

impl Cipher {
    /// Create a new cipher from a 256-bit key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
        Self { cipher }
    }

    /// Encrypt data with a random nonce.
    ///
    /// Returns: nonce (12 bytes) || ciphertext || tag (16 bytes)
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    /// Decrypt data that was encrypted with `encrypt`.
    ///
    /// Expects: nonce (12 bytes) || ciphertext || tag (16 bytes)
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::Integrity);
        }

        let (nonce_bytes, ciphertext) = ciphertext.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Integrity)
    }

    /// Encrypt everything `reader` yields into `writer`.
    ///
    /// Output: nonce prefix (7 bytes) || sealed chunks. Every chunk but the last
    /// holds `STREAM_CHUNK_SIZE` plaintext bytes; the last one is sealed with the
    /// final-block flag so truncation at a chunk boundary is detected.
    /// Returns the number of plaintext bytes consumed.
    pub fn encrypt_stream(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> Result<u64> {
        let mut prefix = [0u8; STREAM_NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut prefix);
        writer.write_all(&prefix)?;

        let mut encryptor =
            EncryptorBE32::from_aead(self.cipher.clone(), GenericArray::from_slice(&prefix));

        let mut current = vec![0u8; STREAM_CHUNK_SIZE];
        let mut ahead = vec![0u8; STREAM_CHUNK_SIZE];
        let mut filled = read_full(reader, &mut current)?;
        let mut total = 0u64;

        while filled == STREAM_CHUNK_SIZE {
            let next = read_full(reader, &mut ahead)?;
            if next == 0 {
                break;
            }
            let sealed = encryptor
                .encrypt_next(&current[..filled])
                .map_err(|e| Error::Encryption(e.to_string()))?;
            writer.write_all(&sealed)?;
            total += filled as u64;
            std::mem::swap(&mut current, &mut ahead);
            filled = next;
        }

        let sealed = encryptor
            .encrypt_last(&current[..filled])
            .map_err(|e| Error::Encryption(e.to_string()))?;
        writer.write_all(&sealed)?;
        writer.flush()?;
        total += filled as u64;

        Ok(total)
    }

    /// Decrypt a stream produced by `encrypt_stream` into `writer`.
    ///
    /// Returns the number of plaintext bytes written. Any authentication
    /// failure, including a missing final chunk, is `Error::Integrity`.
    pub fn decrypt_stream(&self, reader: &mut dyn Read, writer: &mut dyn Write) -> Result<u64> {
        let mut prefix = [0u8; STREAM_NONCE_SIZE];
        if read_full(reader, &mut prefix)? != STREAM_NONCE_SIZE {
            return Err(Error::Integrity);
        }

        let mut decryptor =
            DecryptorBE32::from_aead(self.cipher.clone(), GenericArray::from_slice(&prefix));

        let sealed_chunk = STREAM_CHUNK_SIZE + TAG_SIZE;
        let mut current = vec![0u8; sealed_chunk];
        let mut ahead = vec![0u8; sealed_chunk];
        let mut filled = read_full(reader, &mut current)?;
        let mut total = 0u64;

        while filled == sealed_chunk {
            let next = read_full(reader, &mut ahead)?;
            if next == 0 {
                break;
            }
            let plain = decryptor
                .decrypt_next(&current[..filled])
                .map_err(|_| Error::Integrity)?;
            writer.write_all(&plain)?;
            total += plain.len() as u64;
            std::mem::swap(&mut current, &mut ahead);
            filled = next;
        }

        if filled < TAG_SIZE {
            return Err(Error::Integrity);
        }
        let plain = decryptor
            .decrypt_last(&current[..filled])
            .map_err(|_| Error::Integrity)?;
        writer.write_all(&plain)?;
        writer.flush()?;
        total += plain.len() as u64;

        Ok(total)
    }
}

/// Read until `buf` is full or the reader is exhausted.
pub(crate) fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
