//! Authenticated encryption for secret-bearing configuration values.
//!
//! Uses ChaCha20-Poly1305 with the derived [`CryptoKey`].
//! Wire format: `base64(nonce || ciphertext)` with a 12-byte nonce.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::keys::CryptoKey;

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LENGTH: usize = 12;

/// Cryptographic errors
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("No crypto key available")]
    MissingKey,

    #[error("Encrypted payload too short")]
    PayloadTooShort,

    #[error("Decryption failed - invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Capability to turn an encrypted configuration value into plaintext.
///
/// `key` is `None` when key derivation failed; implementations must fail
/// rather than fall back to some default key.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, key: Option<&CryptoKey>, encrypted: &str) -> CryptoResult<String>;
}

/// Default [`Decryptor`] backed by [`decrypt_secret`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaChaDecryptor;

impl Decryptor for ChaChaDecryptor {
    fn decrypt(&self, key: Option<&CryptoKey>, encrypted: &str) -> CryptoResult<String> {
        let key = key.ok_or(CryptoError::MissingKey)?;
        decrypt_secret(key, encrypted)
    }
}

fn cipher(key: &CryptoKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Decrypt a `base64(nonce || ciphertext)` value into a UTF-8 string.
pub fn decrypt_secret(key: &CryptoKey, encrypted: &str) -> CryptoResult<String> {
    let data = BASE64.decode(encrypted.trim())?;
    if data.len() < NONCE_LENGTH {
        return Err(CryptoError::PayloadTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LENGTH);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher(key)
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

/// Encrypt `plaintext` into the format [`decrypt_secret`] accepts.
///
/// A fresh random nonce is drawn for every call.
pub fn encrypt_secret(key: &CryptoKey, plaintext: &str) -> CryptoResult<String> {
    use rand::RngCore;

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher(key)
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyDeriver;

    fn key(fragment: &str) -> CryptoKey {
        KeyDeriver::new().derive_key(fragment).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = key("0123456789abcdef");
        let sealed = encrypt_secret(&key, "-----BEGIN CERTIFICATE-----").unwrap();
        assert_ne!(sealed, "-----BEGIN CERTIFICATE-----");

        let opened = decrypt_secret(&key, &sealed).unwrap();
        assert_eq!(opened, "-----BEGIN CERTIFICATE-----");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let key = key("0123456789abcdef");
        let a = encrypt_secret(&key, "same").unwrap();
        let b = encrypt_secret(&key, "same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt_secret(&key("0123456789abcdef"), "secret").unwrap();
        let result = decrypt_secret(&key("fedcba9876543210"), &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_not_base64() {
        let result = decrypt_secret(&key("0123456789abcdef"), "not base64 at all!");
        assert!(matches!(result, Err(CryptoError::Base64(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let short = BASE64.encode([0u8; 8]);
        let result = decrypt_secret(&key("0123456789abcdef"), &short);
        assert!(matches!(result, Err(CryptoError::PayloadTooShort)));
    }

    #[test]
    fn test_tampered_payload() {
        let key = key("0123456789abcdef");
        let sealed = encrypt_secret(&key, "secret").unwrap();
        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let result = decrypt_secret(&key, &BASE64.encode(raw));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_decryptor_without_key() {
        let result = ChaChaDecryptor.decrypt(None, "anything");
        assert!(matches!(result, Err(CryptoError::MissingKey)));
    }
}
