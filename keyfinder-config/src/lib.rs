//! Configuration management for the key discovery services

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `KEY_DISCOVERY_HKP__URL`
pub const ENV_PREFIX: &str = "KEY_DISCOVERY";

fn default_dns_timeout() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    10
}

fn default_max_keys() -> usize {
    5
}

fn default_deadline() -> u64 {
    15
}

/// DNS (RFC 7929 OPENPGPKEY) backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub enable: bool,
    /// Nameserver IP address; system defaults are used when absent
    pub nameserver: Option<String>,
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            nameserver: None,
            timeout_secs: default_dns_timeout(),
        }
    }
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Keybase-style directory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeybaseConfig {
    #[serde(default)]
    pub enable: bool,
    /// Base URL of the directory API (required when enabled)
    pub url: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for KeybaseConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

impl KeybaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HKP keyserver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HkpConfig {
    #[serde(default)]
    pub enable: bool,
    /// Base URL of the keyserver (required when enabled)
    pub url: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on keys fetched per lookup
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

impl Default for HkpConfig {
    fn default() -> Self {
        Self {
            enable: false,
            url: None,
            timeout_secs: default_http_timeout(),
            max_keys: default_max_keys(),
        }
    }
}

impl HkpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Key discovery configuration
///
/// Each backend section is optional. A missing section, or one with
/// `enable = false`, keeps that backend out of the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyDiscoveryConfig {
    #[serde(default)]
    pub dns: Option<DnsConfig>,
    #[serde(default)]
    pub keybase: Option<KeybaseConfig>,
    #[serde(default)]
    pub hkp: Option<HkpConfig>,
    /// Caller-level deadline for one lookup across all backends
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
    pub log_level: Option<String>,
}

impl Default for KeyDiscoveryConfig {
    fn default() -> Self {
        Self {
            dns: None,
            keybase: None,
            hkp: None,
            deadline_secs: default_deadline(),
            log_level: None,
        }
    }
}

impl KeyDiscoveryConfig {
    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Load configuration from an optional file, overridden by environment
    /// variables (`KEY_DISCOVERY_DEADLINE_SECS`, `KEY_DISCOVERY_HKP__URL`, ...)
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Overall lookup deadline
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_config_defaults() {
        let config = KeyDiscoveryConfig::default();
        assert!(config.dns.is_none());
        assert!(config.keybase.is_none());
        assert!(config.hkp.is_none());
        assert_eq!(config.deadline(), Duration::from_secs(15));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
            deadline_secs = 7

            [dns]
            enable = true
            nameserver = "9.9.9.9"

            [keybase]
            enable = false

            [hkp]
            enable = true
            url = "https://keys.example.org"
            max_keys = 2
            "#,
        );

        let config = KeyDiscoveryConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.deadline(), Duration::from_secs(7));

        let dns = config.dns.unwrap();
        assert!(dns.enable);
        assert_eq!(dns.nameserver.as_deref(), Some("9.9.9.9"));
        assert_eq!(dns.timeout(), Duration::from_secs(5));

        assert!(!config.keybase.unwrap().enable);

        let hkp = config.hkp.unwrap();
        assert_eq!(hkp.url.as_deref(), Some("https://keys.example.org"));
        assert_eq!(hkp.timeout(), Duration::from_secs(10));
        assert_eq!(hkp.max_keys, 2);
    }

    #[test]
    fn test_section_without_url_still_parses() {
        // Missing endpoints are reported by the registry, not the loader
        let file = write_config("[hkp]\nenable = true\n");
        let config = KeyDiscoveryConfig::load(Some(file.path())).unwrap();
        let hkp = config.hkp.unwrap();
        assert!(hkp.enable);
        assert!(hkp.url.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = KeyDiscoveryConfig::load(Some(Path::new("/nonexistent/keyfinder.toml")));
        assert!(result.is_err());
    }
}
