//! Certificate/private key pairs parsed from PEM.

use std::fmt;
use std::io;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use thiserror::Error;
use tracing::debug;

/// Which side of a connection a certificate authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateRole {
    /// Presented by our listener.
    Server,
    /// Presented on outbound mutually authenticated calls.
    Client,
}

impl fmt::Display for CertificateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
        }
    }
}

/// Certificate loading errors
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("Malformed PEM: {0}")]
    Pem(#[from] io::Error),

    #[error("{0} content not supplied")]
    MissingContent(&'static str),

    #[error("No certificate found in PEM content")]
    NoCertificate,

    #[error("No private key found in PEM content")]
    NoPrivateKey,

    #[error("Unsupported private key: {0}")]
    UnsupportedKey(rustls::Error),

    #[error("Private key does not match certificate: {0}")]
    KeyMismatch(rustls::Error),
}

/// A parsed certificate chain with its private key, ready for rustls.
pub struct TlsCertificate {
    role: CertificateRole,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    certified: Arc<CertifiedKey>,
}

impl TlsCertificate {
    pub fn role(&self) -> CertificateRole {
        self.role
    }

    /// Leaf first, as found in the PEM content.
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    /// Signing-ready form, usable with a rustls certificate resolver.
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified)
    }
}

impl fmt::Debug for TlsCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCertificate")
            .field("role", &self.role)
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Capability to turn PEM content into a [`TlsCertificate`].
pub trait CertificateParser: Send + Sync {
    fn parse(
        &self,
        role: CertificateRole,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<TlsCertificate, CertificateError>;
}

/// Default [`CertificateParser`] built on `rustls-pemfile`.
#[derive(Debug, Clone)]
pub struct PemCertificateParser {
    provider: Arc<CryptoProvider>,
}

impl PemCertificateParser {
    pub fn new() -> Self {
        Self::with_provider(Arc::new(rustls::crypto::ring::default_provider()))
    }

    pub fn with_provider(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl Default for PemCertificateParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateParser for PemCertificateParser {
    fn parse(
        &self,
        role: CertificateRole,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<TlsCertificate, CertificateError> {
        if cert_pem.trim().is_empty() {
            return Err(CertificateError::MissingContent("certificate"));
        }
        if key_pem.trim().is_empty() {
            return Err(CertificateError::MissingContent("private key"));
        }

        let mut cert_reader = cert_pem.as_bytes();
        let chain: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut cert_reader).collect::<Result<_, _>>()?;
        if chain.is_empty() {
            return Err(CertificateError::NoCertificate);
        }

        let mut key_reader = key_pem.as_bytes();
        let key = rustls_pemfile::private_key(&mut key_reader)?
            .ok_or(CertificateError::NoPrivateKey)?;

        let signing_key = self
            .provider
            .key_provider
            .load_private_key(key.clone_key())
            .map_err(CertificateError::UnsupportedKey)?;

        let certified = CertifiedKey::new(chain.clone(), signing_key);
        certified
            .keys_match()
            .map_err(CertificateError::KeyMismatch)?;

        debug!(%role, chain_len = chain.len(), "Parsed certificate");
        Ok(TlsCertificate {
            role,
            chain,
            key,
            certified: Arc::new(certified),
        })
    }
}

/// Parse a certificate with the default parser.
pub fn load_certificate(
    role: CertificateRole,
    cert_pem: &str,
    key_pem: &str,
) -> Result<TlsCertificate, CertificateError> {
    PemCertificateParser::new().parse(role, cert_pem, key_pem)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(name: &str) -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
        (cert.cert.pem(), cert.key_pair.serialize_pem())
    }

    #[test]
    fn test_matching_pair_loads() {
        let (cert, key) = self_signed("localhost");
        let loaded = load_certificate(CertificateRole::Server, &cert, &key).unwrap();
        assert_eq!(loaded.role(), CertificateRole::Server);
        assert_eq!(loaded.cert_chain().len(), 1);
        assert_eq!(loaded.certified_key().cert.len(), 1);
    }

    #[test]
    fn test_mismatched_pair_fails() {
        let (cert, _) = self_signed("localhost");
        let (_, other_key) = self_signed("localhost");
        let result = load_certificate(CertificateRole::Client, &cert, &other_key);
        assert!(matches!(result, Err(CertificateError::KeyMismatch(_))));
    }

    #[test]
    fn test_malformed_pem_fails() {
        let (_, key) = self_signed("localhost");
        let broken = "-----BEGIN CERTIFICATE-----\n!!!!\n-----END CERTIFICATE-----\n";
        let result = load_certificate(CertificateRole::Server, broken, &key);
        assert!(matches!(result, Err(CertificateError::Pem(_))));
    }

    #[test]
    fn test_non_pem_content_fails() {
        let (_, key) = self_signed("localhost");
        let result = load_certificate(CertificateRole::Server, "hello world", &key);
        assert!(matches!(result, Err(CertificateError::NoCertificate)));

        let (cert, _) = self_signed("localhost");
        let result = load_certificate(CertificateRole::Server, &cert, "hello world");
        assert!(matches!(result, Err(CertificateError::NoPrivateKey)));
    }

    #[test]
    fn test_swapped_pem_fails() {
        let (cert, key) = self_signed("localhost");
        let result = load_certificate(CertificateRole::Server, &key, &cert);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_content() {
        let (cert, _) = self_signed("localhost");
        let result = load_certificate(CertificateRole::Client, &cert, "");
        assert!(matches!(
            result,
            Err(CertificateError::MissingContent("private key"))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let (cert, key) = self_signed("localhost");
        let loaded = load_certificate(CertificateRole::Server, &cert, &key).unwrap();
        let rendered = format!("{:?}", loaded);
        assert!(rendered.contains("Server"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
