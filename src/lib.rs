//! Startup bootstrap of trust material for a network service.
//!
//! Derives the secret-decryption key, decrypts secret-bearing configuration
//! values, parses TLS certificate/key pairs and builds the CA trust pool,
//! reporting every failure at once.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod keys;
pub mod secrets;
pub mod tls;

pub use bootstrap::{bootstrap, Artifact, BootstrapPolicy, BootstrapResult, Bootstrapper};
pub use config::AppConfig;
pub use error::{AppError, AppResult, BootstrapError, BootstrapFailure};
pub use keys::{CryptoKey, KeyDeriver};
