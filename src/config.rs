use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use zeroize::Zeroize;

use crate::bootstrap::BootstrapPolicy;
use crate::secrets::{SecretName, SecretSource};

/// Environment prefix, e.g. `TRUSTBOOT_SECRETS__SERVER_CERT`.
pub const ENV_PREFIX: &str = "TRUSTBOOT";

/// Raw secret values as supplied by the deployment.
///
/// Everything except `key_fragment` is expected to be encrypted. Empty means
/// "not supplied".
#[derive(Deserialize, Clone, Default)]
pub struct SecretsConfig {
    /// Deployment half of the crypto key
    #[serde(default)]
    pub key_fragment: String,
    #[serde(default)]
    pub client_cert: String,
    #[serde(default)]
    pub client_key: String,
    #[serde(default)]
    pub server_cert: String,
    #[serde(default)]
    pub server_key: String,
    /// CA bundle used to verify peers
    #[serde(default)]
    pub ca_cert: String,
}

impl SecretsConfig {
    fn field(&self, name: SecretName) -> &str {
        match name {
            SecretName::CryptoKeyFragment => &self.key_fragment,
            SecretName::ClientCertContent => &self.client_cert,
            SecretName::ClientKeyContent => &self.client_key,
            SecretName::ServerCertContent => &self.server_cert,
            SecretName::ServerKeyContent => &self.server_key,
            SecretName::CACertContent => &self.ca_cert,
        }
    }
}

impl SecretSource for SecretsConfig {
    fn lookup(&self, name: SecretName) -> Option<String> {
        let value = self.field(name);
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

impl Drop for SecretsConfig {
    fn drop(&mut self) {
        self.key_fragment.zeroize();
        self.client_cert.zeroize();
        self.client_key.zeroize();
        self.server_cert.zeroize();
        self.server_key.zeroize();
        self.ca_cert.zeroize();
    }
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SecretsConfig");
        for name in std::iter::once(SecretName::CryptoKeyFragment).chain(SecretName::ENCRYPTED) {
            let state = if self.field(name).is_empty() {
                "<unset>"
            } else {
                "<redacted>"
            };
            s.field(name.as_str(), &state);
        }
        s.finish()
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub policy: BootstrapPolicy,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
    }

    /// Load with a custom environment source; the files are still consulted.
    ///
    /// Environment values stay strings so secrets such as an all-digit key
    /// fragment are not coerced. Policy flags accept `true`/`false`/`1`/`0`
    /// from their string form.
    pub fn load_with(environment: Environment) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // e.g. TRUSTBOOT_SECRETS__CA_CERT, TRUSTBOOT_POLICY__SERVER_TLS
            .add_source(environment)
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(Some(map))
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = AppConfig::load_with(env(&[])).unwrap();
        assert!(config.secrets.lookup(SecretName::ServerCertContent).is_none());
        assert!(!config.policy.server_tls);
        assert!(config.policy.client_certificate);
        assert!(config.policy.client_validation);
    }

    #[test]
    fn test_environment_overrides() {
        let config = AppConfig::load_with(env(&[
            ("TRUSTBOOT_SECRETS__KEY_FRAGMENT", "abcdefghijklmnop"),
            ("TRUSTBOOT_SECRETS__SERVER_CERT", "c2VhbGVk"),
            ("TRUSTBOOT_POLICY__SERVER_TLS", "true"),
        ]))
        .unwrap();

        assert_eq!(
            config.secrets.lookup(SecretName::CryptoKeyFragment).as_deref(),
            Some("abcdefghijklmnop")
        );
        assert_eq!(
            config.secrets.lookup(SecretName::ServerCertContent).as_deref(),
            Some("c2VhbGVk")
        );
        assert!(config.policy.server_tls);
    }

    #[test]
    fn test_numeric_fragment_kept_verbatim() {
        let config = AppConfig::load_with(env(&[
            ("TRUSTBOOT_SECRETS__KEY_FRAGMENT", "0123456789012345"),
            ("TRUSTBOOT_SECRETS__CA_CERT", "1e5"),
        ]))
        .unwrap();

        assert_eq!(
            config.secrets.lookup(SecretName::CryptoKeyFragment).as_deref(),
            Some("0123456789012345")
        );
        assert_eq!(
            config.secrets.lookup(SecretName::CACertContent).as_deref(),
            Some("1e5")
        );
    }

    #[test]
    fn test_policy_flags_parse_from_strings() {
        let config = AppConfig::load_with(env(&[
            ("TRUSTBOOT_POLICY__SERVER_TLS", "1"),
            ("TRUSTBOOT_POLICY__CLIENT_CERTIFICATE", "false"),
            ("TRUSTBOOT_POLICY__CLIENT_VALIDATION", "FALSE"),
        ]))
        .unwrap();

        assert!(config.policy.server_tls);
        assert!(!config.policy.client_certificate);
        assert!(!config.policy.client_validation);
    }

    #[test]
    fn test_debug_redacts_values() {
        let mut secrets = SecretsConfig::default();
        secrets.server_key = "super secret".to_string();
        let rendered = format!("{:?}", secrets);
        assert!(!rendered.contains("super secret"));
        assert!(rendered.contains("ServerKeyContent: \"<redacted>\""));
        assert!(rendered.contains("CACertContent: \"<unset>\""));
    }
}
