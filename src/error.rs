use std::fmt;

use thiserror::Error;

use crate::secrets::{CryptoError, SecretName};
use crate::tls::{CertificateError, CertificateRole, PoolError};

/// A single failed bootstrap step.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Invalid crypto key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Failed to decrypt secret {name}: {source}")]
    DecryptFailed {
        name: SecretName,
        #[source]
        source: CryptoError,
    },

    #[error("Failed to load {role} certificate: {source}")]
    CertificateParse {
        role: CertificateRole,
        #[source]
        source: CertificateError,
    },

    #[error("Failed to build CA trust pool: {0}")]
    PoolParse(#[from] PoolError),

    #[error("{artifact} is configured but failed to initialize")]
    NotInitialized { artifact: &'static str },
}

impl BootstrapError {
    /// Short name of the step that produced this error.
    pub fn step(&self) -> String {
        match self {
            Self::InvalidKeyLength { .. } => "crypto key".to_string(),
            Self::DecryptFailed { name, .. } => format!("secret {}", name),
            Self::CertificateParse { role, .. } => format!("{} certificate", role),
            Self::PoolParse(_) => "CA trust pool".to_string(),
            Self::NotInitialized { artifact } => artifact.to_string(),
        }
    }
}

/// Every step failure of one bootstrap pass, in the order they occurred.
///
/// Only constructed with at least one error.
#[derive(Debug)]
pub struct BootstrapFailure {
    errors: Vec<BootstrapError>,
}

impl BootstrapFailure {
    /// Returns `None` when `errors` is empty.
    pub fn from_errors(errors: Vec<BootstrapError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[BootstrapError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &BootstrapError> {
        self.errors.iter()
    }
}

impl fmt::Display for BootstrapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bootstrap failed with {} error(s)", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            write!(f, "; [{}] {}: {}", i + 1, err.step(), err)?;
        }
        Ok(())
    }
}

impl std::error::Error for BootstrapFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl<'a> IntoIterator for &'a BootstrapFailure {
    type Item = &'a BootstrapError;
    type IntoIter = std::slice::Iter<'a, BootstrapError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapFailure),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_never_empty() {
        assert!(BootstrapFailure::from_errors(Vec::new()).is_none());

        let failure = BootstrapFailure::from_errors(vec![BootstrapError::NotInitialized {
            artifact: "trust pool",
        }])
        .unwrap();
        assert_eq!(failure.len(), 1);
    }

    #[test]
    fn test_failure_lists_every_step() {
        let failure = BootstrapFailure::from_errors(vec![
            BootstrapError::InvalidKeyLength {
                expected: 32,
                actual: 20,
            },
            BootstrapError::DecryptFailed {
                name: SecretName::ServerCertContent,
                source: CryptoError::DecryptionFailed,
            },
            BootstrapError::PoolParse(PoolError::NoCertificates { skipped: 0 }),
        ])
        .unwrap();

        assert_eq!(failure.len(), 3);
        let message = failure.to_string();
        assert!(message.starts_with("bootstrap failed with 3 error(s)"));

        let key = message.find("[1] crypto key").unwrap();
        let secret = message.find("[2] secret ServerCertContent").unwrap();
        let pool = message.find("[3] CA trust pool").unwrap();
        assert!(key < secret && secret < pool);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BootstrapError>();
        assert_send_sync::<BootstrapFailure>();
    }
}
