//! TLS trust material: certificate/key pairs and CA trust pools.
//!
//! Everything here works on in-memory PEM content. Reading files or
//! environment variables is the caller's concern.

pub mod certificate;
pub mod pool;

pub use certificate::{
    load_certificate, CertificateError, CertificateParser, CertificateRole, PemCertificateParser,
    TlsCertificate,
};
pub use pool::{build_pool, PoolError, TrustPool};
