//! Cryptographic services for zilfs containers.
//!
//! This module provides:
//! - The [`AeadService`] boundary the container codec encrypts through
//! - An AES-256-GCM implementation of it, buffered and streamed
//! - Argon2id password-based key derivation

mod aead;
mod cipher;
mod kdf;
mod key;

pub use aead::{AeadService, Aes256GcmAead};
pub use cipher::Cipher;
pub use kdf::KeyDerivation;
pub use key::{Key, KEY_SIZE};
