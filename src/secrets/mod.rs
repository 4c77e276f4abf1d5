//! Encrypted configuration secrets.
//!
//! Sensitive values (certificate bodies, private keys) reach the process
//! encrypted. They are decrypted once at startup with the key produced by
//! [`crate::keys::KeyDeriver`] and held only in memory afterwards.
//!
//! ## Security Model
//!
//! - Half of the key is compiled in, the other half is supplied at deploy time
//! - Values are sealed with ChaCha20-Poly1305 and a random nonce
//! - A missing value disables the feature that needs it; it is not an error
//! - Plaintext is zeroized on drop
//!
//! ## Usage
//!
//! ```ignore
//! let key = KeyDeriver::new().derive_key(&fragment)?;
//! let resolver = SecretDecryptor::new(&source, &ChaChaDecryptor, Some(&key));
//! match resolver.resolve(SecretName::ServerCertContent) {
//!     Secret::Valid(pem) => { /* use pem */ }
//!     Secret::Absent => { /* TLS disabled */ }
//!     Secret::Invalid { error, .. } => { /* report error */ }
//! }
//! ```

pub mod crypto;
pub mod store;

pub use crypto::{
    decrypt_secret, encrypt_secret, ChaChaDecryptor, CryptoError, CryptoResult, Decryptor,
};
pub use store::{resolve_secret, ResolvedSecrets, Secret, SecretDecryptor, SecretName, SecretSource};
