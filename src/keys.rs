//! Symmetric key derivation.
//!
//! The secret key is split in two: a fragment compiled into the binary and a
//! fragment supplied by the deployment. Neither half alone decrypts anything.

use std::fmt;

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::BootstrapError;

/// Required key length in bytes (ChaCha20-Poly1305).
pub const KEY_LENGTH: usize = 32;

/// Fragment embedded at build time. The deployment supplies the remaining
/// `KEY_LENGTH - EMBEDDED_KEY_FRAGMENT.len()` bytes.
pub const EMBEDDED_KEY_FRAGMENT: &str = "tb.k3y-Fr4gm3nt!";

/// A validated 32-byte symmetric key.
///
/// Only [`KeyDeriver`] constructs one, so holding a `CryptoKey` means the
/// length check has passed. Bytes are wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey {
    bytes: [u8; KEY_LENGTH],
}

impl CryptoKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.bytes
    }
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoKey").finish_non_exhaustive()
    }
}

/// Combines the embedded fragment with an external one.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    embedded: &'static str,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self {
            embedded: EMBEDDED_KEY_FRAGMENT,
        }
    }

    /// Use a different embedded fragment. Mostly useful for builds that
    /// inject their own fragment.
    pub fn with_embedded(embedded: &'static str) -> Self {
        Self { embedded }
    }

    pub fn embedded_len(&self) -> usize {
        self.embedded.len()
    }

    /// Derive the key from `fragment`.
    ///
    /// Fails with [`BootstrapError::InvalidKeyLength`] unless the combined
    /// byte length is exactly [`KEY_LENGTH`]. No partial key is ever returned.
    pub fn derive_key(&self, fragment: &str) -> Result<CryptoKey, BootstrapError> {
        let actual = self.embedded.len() + fragment.len();
        if actual != KEY_LENGTH {
            return Err(BootstrapError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual,
            });
        }

        let mut bytes = [0u8; KEY_LENGTH];
        let (head, tail) = bytes.split_at_mut(self.embedded.len());
        head.copy_from_slice(self.embedded.as_bytes());
        tail.copy_from_slice(fragment.as_bytes());

        debug!("Derived {}-byte crypto key", KEY_LENGTH);
        Ok(CryptoKey { bytes })
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}
