//! Startup orchestration.
//!
//! [`Bootstrapper::bootstrap`] runs every step exactly once, in a fixed order:
//!
//! 1. derive the crypto key
//! 2. resolve each encrypted secret
//! 3. load the server certificate, the client certificate and the CA pool
//!
//! A failing step never stops the others. Every error is kept, in step order,
//! in the returned [`BootstrapResult`], and artifacts that did load are
//! published regardless. Whether a degraded result is good enough to start
//! serving is up to the caller.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{BootstrapError, BootstrapFailure};
use crate::keys::{CryptoKey, KeyDeriver};
use crate::secrets::{
    ChaChaDecryptor, Decryptor, ResolvedSecrets, SecretDecryptor, SecretName, SecretSource,
};
use crate::tls::{
    CertificateParser, CertificateRole, PemCertificateParser, TlsCertificate, TrustPool,
};

/// Which optional artifacts the deployment wants.
///
/// An enabled artifact is still only loaded when its content was supplied; a
/// disabled one is never loaded, even if content is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BootstrapPolicy {
    /// Serve over TLS with the server certificate
    #[serde(default)]
    pub server_tls: bool,
    /// Present the client certificate on outbound calls
    #[serde(default = "default_true")]
    pub client_certificate: bool,
    /// Verify peers against the CA pool
    #[serde(default = "default_true")]
    pub client_validation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            server_tls: false,
            client_certificate: true,
            client_validation: true,
        }
    }
}

/// Publication state of one bootstrap artifact.
#[derive(Debug)]
pub enum Artifact<T> {
    /// Disabled, or no content supplied.
    NotConfigured,
    Ready(T),
    /// Configured but unusable. The cause is in the bootstrap failure.
    Failed,
}

impl<T> Artifact<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::NotConfigured)
    }

    /// `Ok(None)` when not configured, `Ok(Some)` when ready, and
    /// `NotInitialized` when configured but failed.
    pub fn get(&self, artifact: &'static str) -> Result<Option<&T>, BootstrapError> {
        match self {
            Self::NotConfigured => Ok(None),
            Self::Ready(value) => Ok(Some(value)),
            Self::Failed => Err(BootstrapError::NotInitialized { artifact }),
        }
    }

    fn state(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not configured",
            Self::Ready(_) => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Everything one bootstrap pass produced. Immutable once returned.
#[derive(Debug)]
pub struct BootstrapResult {
    key: Option<CryptoKey>,
    secrets: ResolvedSecrets,
    server_certificate: Artifact<TlsCertificate>,
    client_certificate: Artifact<TlsCertificate>,
    trust_pool: Artifact<TrustPool>,
    failure: Option<BootstrapFailure>,
}

impl BootstrapResult {
    /// The derived key, if derivation succeeded.
    pub fn crypto_key(&self) -> Option<&CryptoKey> {
        self.key.as_ref()
    }

    pub fn secrets(&self) -> &ResolvedSecrets {
        &self.secrets
    }

    pub fn server_certificate(&self) -> Result<Option<&TlsCertificate>, BootstrapError> {
        self.server_certificate.get("server certificate")
    }

    pub fn client_certificate(&self) -> Result<Option<&TlsCertificate>, BootstrapError> {
        self.client_certificate.get("client certificate")
    }

    pub fn trust_pool(&self) -> Result<Option<&TrustPool>, BootstrapError> {
        self.trust_pool.get("CA trust pool")
    }

    pub fn server_certificate_state(&self) -> &Artifact<TlsCertificate> {
        &self.server_certificate
    }

    pub fn client_certificate_state(&self) -> &Artifact<TlsCertificate> {
        &self.client_certificate
    }

    pub fn trust_pool_state(&self) -> &Artifact<TrustPool> {
        &self.trust_pool
    }

    /// The consolidated error; `None` iff every step succeeded.
    pub fn failure(&self) -> Option<&BootstrapFailure> {
        self.failure.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// Split into the artifacts and the consolidated error.
    pub fn into_parts(mut self) -> (Self, Result<(), BootstrapFailure>) {
        match self.failure.take() {
            Some(failure) => (self, Err(failure)),
            None => (self, Ok(())),
        }
    }

    /// Log one line per artifact.
    pub fn log_summary(&self) {
        let crypto_key = if self.key.is_some() { "ready" } else { "failed" };
        info!(
            crypto_key,
            server_certificate = self.server_certificate.state(),
            client_certificate = self.client_certificate.state(),
            trust_pool = self.trust_pool.state(),
            "Bootstrap summary"
        );
        if let Some(failure) = &self.failure {
            for err in failure {
                warn!(step = %err.step(), "{}", err);
            }
        }
    }
}

/// Runs the bootstrap sequence against a [`SecretSource`].
///
/// The cipher and certificate parser are injectable so tests can substitute
/// them.
pub struct Bootstrapper {
    source: Arc<dyn SecretSource>,
    policy: BootstrapPolicy,
    deriver: KeyDeriver,
    decryptor: Arc<dyn Decryptor>,
    parser: Arc<dyn CertificateParser>,
}

impl Bootstrapper {
    pub fn new(source: impl SecretSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
            policy: BootstrapPolicy::default(),
            deriver: KeyDeriver::new(),
            decryptor: Arc::new(ChaChaDecryptor),
            parser: Arc::new(PemCertificateParser::new()),
        }
    }

    pub fn policy(mut self, policy: BootstrapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key_deriver(mut self, deriver: KeyDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn decryptor(mut self, decryptor: impl Decryptor + 'static) -> Self {
        self.decryptor = Arc::new(decryptor);
        self
    }

    pub fn certificate_parser(mut self, parser: impl CertificateParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Run every step once and collect the outcome.
    pub fn bootstrap(&self) -> BootstrapResult {
        let mut errors = Vec::new();

        let fragment = Zeroizing::new(
            self.source
                .lookup(SecretName::CryptoKeyFragment)
                .unwrap_or_default(),
        );
        let key = match self.deriver.derive_key(&fragment) {
            Ok(key) => {
                info!("Crypto key derived");
                Some(key)
            }
            Err(err) => {
                warn!(error = %err, "Crypto key derivation failed");
                errors.push(err);
                None
            }
        };

        let secrets =
            SecretDecryptor::new(self.source.as_ref(), self.decryptor.as_ref(), key.as_ref())
                .resolve_all();
        errors.extend(secrets.failures());

        let server_certificate = if self.policy.server_tls {
            self.load_certificate(
                CertificateRole::Server,
                &secrets,
                SecretName::ServerCertContent,
                SecretName::ServerKeyContent,
                &mut errors,
            )
        } else {
            debug!("Server TLS disabled, server certificate cleared");
            Artifact::NotConfigured
        };

        let client_certificate = if self.policy.client_certificate {
            self.load_certificate(
                CertificateRole::Client,
                &secrets,
                SecretName::ClientCertContent,
                SecretName::ClientKeyContent,
                &mut errors,
            )
        } else {
            debug!("Client certificate disabled");
            Artifact::NotConfigured
        };

        let trust_pool = if self.policy.client_validation {
            Self::load_pool(&secrets, &mut errors)
        } else {
            debug!("Peer validation disabled, CA pool not built");
            Artifact::NotConfigured
        };

        let failure = BootstrapFailure::from_errors(errors);
        match &failure {
            None => info!("Bootstrap complete"),
            Some(failure) => warn!(errors = failure.len(), "Bootstrap completed with errors"),
        }

        BootstrapResult {
            key,
            secrets,
            server_certificate,
            client_certificate,
            trust_pool,
            failure,
        }
    }

    fn load_certificate(
        &self,
        role: CertificateRole,
        secrets: &ResolvedSecrets,
        cert_name: SecretName,
        key_name: SecretName,
        errors: &mut Vec<BootstrapError>,
    ) -> Artifact<TlsCertificate> {
        let (cert, key) = match (secrets.get(cert_name), secrets.get(key_name)) {
            (Some(cert), Some(key)) => (cert, key),
            _ => return Artifact::NotConfigured,
        };

        if cert.is_absent() && key.is_absent() {
            debug!(%role, "No certificate content supplied");
            return Artifact::NotConfigured;
        }

        // A decrypt failure is already recorded against the secret.
        if cert.error().is_some() || key.error().is_some() {
            warn!(%role, "Certificate skipped: its secrets failed to decrypt");
            return Artifact::Failed;
        }

        let cert_pem = cert.plaintext().unwrap_or_default();
        let key_pem = key.plaintext().unwrap_or_default();
        match self.parser.parse(role, cert_pem, key_pem) {
            Ok(certificate) => {
                info!(%role, "Certificate loaded");
                Artifact::Ready(certificate)
            }
            Err(source) => {
                warn!(%role, error = %source, "Certificate failed to load");
                errors.push(BootstrapError::CertificateParse { role, source });
                Artifact::Failed
            }
        }
    }

    fn load_pool(secrets: &ResolvedSecrets, errors: &mut Vec<BootstrapError>) -> Artifact<TrustPool> {
        let Some(ca) = secrets.get(SecretName::CACertContent) else {
            return Artifact::NotConfigured;
        };
        if ca.is_absent() {
            debug!("No CA content supplied");
            return Artifact::NotConfigured;
        }
        let Some(pem) = ca.plaintext() else {
            warn!("CA pool skipped: its secret failed to decrypt");
            return Artifact::Failed;
        };

        match TrustPool::from_pem(pem.as_bytes()) {
            Ok(pool) => {
                info!(anchors = pool.len(), "CA trust pool built");
                Artifact::Ready(pool)
            }
            Err(err) => {
                warn!(error = %err, "CA trust pool failed to build");
                errors.push(BootstrapError::PoolParse(err));
                Artifact::Failed
            }
        }
    }
}

/// Bootstrap `source` with the default cipher and parser.
pub fn bootstrap(source: impl SecretSource + 'static, policy: BootstrapPolicy) -> BootstrapResult {
    Bootstrapper::new(source).policy(policy).bootstrap()
}
