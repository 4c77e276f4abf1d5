//! Named secrets and their resolution.
//!
//! A secret is looked up by name in a [`SecretSource`] and, when present,
//! decrypted with the derived key. Plaintext is zeroized on drop.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::BootstrapError;
use crate::keys::CryptoKey;
use crate::secrets::crypto::{ChaChaDecryptor, Decryptor};

/// The externally supplied values the bootstrap consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SecretName {
    /// Deployment half of the symmetric key. Never encrypted.
    CryptoKeyFragment,
    ClientCertContent,
    ClientKeyContent,
    ServerCertContent,
    ServerKeyContent,
    CACertContent,
}

impl SecretName {
    /// Encrypted secrets, in resolution order.
    pub const ENCRYPTED: [SecretName; 5] = [
        SecretName::ClientCertContent,
        SecretName::ClientKeyContent,
        SecretName::ServerCertContent,
        SecretName::ServerKeyContent,
        SecretName::CACertContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CryptoKeyFragment => "CryptoKeyFragment",
            Self::ClientCertContent => "ClientCertContent",
            Self::ClientKeyContent => "ClientKeyContent",
            Self::ServerCertContent => "ServerCertContent",
            Self::ServerKeyContent => "ServerKeyContent",
            Self::CACertContent => "CACertContent",
        }
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where raw (still encrypted) secret values come from.
///
/// Returning `None` or an empty string both mean "absent".
pub trait SecretSource: Send + Sync {
    fn lookup(&self, name: SecretName) -> Option<String>;
}

impl SecretSource for HashMap<SecretName, String> {
    fn lookup(&self, name: SecretName) -> Option<String> {
        self.get(&name).cloned()
    }
}

impl<S: SecretSource + ?Sized> SecretSource for &S {
    fn lookup(&self, name: SecretName) -> Option<String> {
        (**self).lookup(name)
    }
}

/// Outcome of resolving one secret.
pub enum Secret {
    /// No value supplied; the feature depending on it is disabled.
    Absent,
    /// Decrypted plaintext.
    Valid(Zeroizing<String>),
    /// A value was supplied but could not be decrypted. `raw` is the value
    /// exactly as supplied, kept for diagnostics only.
    Invalid {
        raw: String,
        error: BootstrapError,
    },
}

impl Secret {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Plaintext, only when decryption succeeded.
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            Self::Valid(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BootstrapError> {
        match self {
            Self::Invalid { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Flatten into a `(value, error)` pair.
    ///
    /// Absent yields an empty string and no error. On failure the value is
    /// the undecrypted raw input and must not be used as plaintext. The value
    /// is zeroized on drop either way.
    pub fn into_result(self) -> (Zeroizing<String>, Result<(), BootstrapError>) {
        match self {
            Self::Absent => (Zeroizing::new(String::new()), Ok(())),
            Self::Valid(value) => (value, Ok(())),
            Self::Invalid { raw, error } => (Zeroizing::new(raw), Err(error)),
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Valid(_) => f.write_str("Valid(<redacted>)"),
            Self::Invalid { error, .. } => f
                .debug_struct("Invalid")
                .field("raw", &"<redacted>")
                .field("error", error)
                .finish(),
        }
    }
}

/// Resolves named secrets with a shared read-only key.
pub struct SecretDecryptor<'a> {
    source: &'a dyn SecretSource,
    decryptor: &'a dyn Decryptor,
    key: Option<&'a CryptoKey>,
}

impl<'a> SecretDecryptor<'a> {
    pub fn new(
        source: &'a dyn SecretSource,
        decryptor: &'a dyn Decryptor,
        key: Option<&'a CryptoKey>,
    ) -> Self {
        Self {
            source,
            decryptor,
            key,
        }
    }

    /// Resolve one secret by name.
    pub fn resolve(&self, name: SecretName) -> Secret {
        let raw = match self.source.lookup(name) {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                debug!(secret = %name, "Secret not supplied");
                return Secret::Absent;
            }
        };

        match self.decryptor.decrypt(self.key, &raw) {
            Ok(plaintext) => {
                debug!(secret = %name, "Secret decrypted");
                Secret::Valid(Zeroizing::new(plaintext))
            }
            Err(source) => {
                warn!(secret = %name, error = %source, "Secret could not be decrypted");
                Secret::Invalid {
                    raw,
                    error: BootstrapError::DecryptFailed { name, source },
                }
            }
        }
    }

    /// Resolve every encrypted secret in [`SecretName::ENCRYPTED`] order.
    pub fn resolve_all(&self) -> ResolvedSecrets {
        let secrets = SecretName::ENCRYPTED
            .iter()
            .map(|&name| (name, self.resolve(name)))
            .collect();
        ResolvedSecrets { secrets }
    }
}

/// Convenience wrapper using the default cipher.
pub fn resolve_secret(
    source: &dyn SecretSource,
    key: Option<&CryptoKey>,
    name: SecretName,
) -> Secret {
    SecretDecryptor::new(source, &ChaChaDecryptor, key).resolve(name)
}

/// All resolved secrets of one bootstrap pass.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    secrets: Vec<(SecretName, Secret)>,
}

impl ResolvedSecrets {
    pub fn get(&self, name: SecretName) -> Option<&Secret> {
        self.secrets
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, secret)| secret)
    }

    /// Plaintext of `name`, if it decrypted cleanly.
    pub fn plaintext(&self, name: SecretName) -> Option<&str> {
        self.get(name).and_then(Secret::plaintext)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SecretName, &Secret)> {
        self.secrets.iter().map(|(name, secret)| (*name, secret))
    }

    /// Decrypt errors in resolution order.
    pub fn errors(&self) -> impl Iterator<Item = &BootstrapError> {
        self.secrets.iter().filter_map(|(_, secret)| secret.error())
    }

    /// Owned copies of the decrypt errors, for the consolidated failure.
    pub(crate) fn failures(&self) -> Vec<BootstrapError> {
        self.secrets
            .iter()
            .filter_map(|(name, secret)| match secret {
                Secret::Invalid {
                    error: BootstrapError::DecryptFailed { source, .. },
                    ..
                } => Some(BootstrapError::DecryptFailed {
                    name: *name,
                    source: source.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}
