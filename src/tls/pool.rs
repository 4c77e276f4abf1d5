//! CA trust pool built from PEM content.

use std::fmt;
use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::RootCertStore;
use thiserror::Error;
use tracing::{debug, warn};

/// Trust pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No CA certificates could be added ({skipped} skipped)")]
    NoCertificates { skipped: usize },

    #[error("Failed to build verifier: {0}")]
    Verifier(#[from] VerifierBuilderError),

    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(String),

    #[error("Peer certificate rejected: {0}")]
    Rejected(#[from] rustls::Error),
}

/// A non-empty set of trusted CA certificates.
#[derive(Clone)]
pub struct TrustPool {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl TrustPool {
    /// Build a pool from every CA certificate in `pem`.
    ///
    /// PEM blocks that fail to decode and certificates rustls cannot parse
    /// are skipped; the pool is rejected when nothing at all was added.
    pub fn from_pem(pem: &[u8]) -> Result<Self, PoolError> {
        Self::from_pem_with_provider(pem, Arc::new(rustls::crypto::ring::default_provider()))
    }

    pub fn from_pem_with_provider(
        pem: &[u8],
        provider: Arc<CryptoProvider>,
    ) -> Result<Self, PoolError> {
        let mut reader = pem;
        let mut certs: Vec<CertificateDer<'static>> = Vec::new();
        let mut undecodable = 0;
        for item in rustls_pemfile::certs(&mut reader) {
            match item {
                Ok(cert) => certs.push(cert),
                Err(e) => {
                    debug!(error = %e, "Skipping undecodable PEM block");
                    undecodable += 1;
                }
            }
        }

        let mut roots = RootCertStore::empty();
        let (added, unparsable) = roots.add_parsable_certificates(certs);
        let skipped = undecodable + unparsable;
        if added == 0 {
            return Err(PoolError::NoCertificates { skipped });
        }
        if skipped > 0 {
            warn!(added, skipped, "Some CA certificates could not be parsed");
        }

        debug!(added, "Built CA trust pool");
        Ok(Self {
            roots: Arc::new(roots),
            provider,
        })
    }

    /// Number of trust anchors.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }

    /// Verifier for client certificates presented to our listener.
    pub fn client_verifier(&self) -> Result<Arc<dyn ClientCertVerifier>, PoolError> {
        Ok(
            WebPkiClientVerifier::builder_with_provider(self.roots(), Arc::clone(&self.provider))
                .build()?,
        )
    }

    /// Verifier for server certificates seen on outbound calls.
    pub fn server_verifier(&self) -> Result<Arc<WebPkiServerVerifier>, PoolError> {
        Ok(
            WebPkiServerVerifier::builder_with_provider(self.roots(), Arc::clone(&self.provider))
                .build()?,
        )
    }

    /// Check that `end_entity` chains to this pool and is valid for `dns_name`.
    pub fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        dns_name: &str,
    ) -> Result<(), PoolError> {
        let server_name = ServerName::try_from(dns_name)
            .map_err(|_| PoolError::InvalidDnsName(dns_name.to_string()))?;
        self.server_verifier()?.verify_server_cert(
            end_entity,
            intermediates,
            &server_name,
            &[],
            UnixTime::now(),
        )?;
        Ok(())
    }

    /// Check that `end_entity` chains to this pool as a client certificate.
    pub fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
    ) -> Result<(), PoolError> {
        self.client_verifier()?
            .verify_client_cert(end_entity, intermediates, UnixTime::now())?;
        Ok(())
    }
}

impl fmt::Debug for TrustPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustPool")
            .field("anchors", &self.roots.len())
            .finish()
    }
}

/// Build a pool with the default crypto provider.
pub fn build_pool(pem: &[u8]) -> Result<TrustPool, PoolError> {
    TrustPool::from_pem(pem)
}
