//! Node configuration
//!
//! Credentials and the ingestion origin are fixed once the node is
//! initialized. Timers and retry tunables carry the defaults below and can be
//! overridden from TOML or through the builder methods.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Device name used when the caller leaves it empty
pub const DEFAULT_DEVICE_NAME: &str = "ESP32-Device";

/// Environment variable overriding `wifi.password`
pub const WIFI_PASSWORD_ENV: &str = "FIELDNODE_WIFI_PASSWORD";
/// Environment variable overriding `platform.api_key`
pub const API_KEY_ENV: &str = "FIELDNODE_API_KEY";

/// Complete node configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub device: DeviceSection,
    pub wifi: WifiSection,
    pub platform: PlatformSection,
}

/// Device identity and console behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Identity tag used in payloads and as the link hostname
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Emit annotated lines on the debug sink
    #[serde(default)]
    pub debug: bool,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            debug: false,
        }
    }
}

/// Wireless link settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WifiSection {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    /// Link-up budget in milliseconds (default: 30000)
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Let `tick` bring the link back after it drops (default: true)
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

/// Ingestion platform settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformSection {
    /// Ingestion origin, without trailing slash once validated
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Per-attempt HTTP timeout in milliseconds (default: 15000)
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Attempts per publish (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the linear retry backoff in milliseconds (default: 2000)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Liveness cadence in milliseconds (default: 300000 = 5 minutes)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Consecutive failures before the link is reset (default: 5)
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_connection_timeout_ms() -> u64 {
    30_000
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    15_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_heartbeat_interval_ms() -> u64 {
    300_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid base URL '{0}': must be an absolute http(s) URL")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

impl NodeConfig {
    /// Configuration with the five identity fields and every tunable at its default
    pub fn new(
        ssid: impl Into<String>,
        password: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            device: DeviceSection {
                name: device_name.into(),
                debug: false,
            },
            wifi: WifiSection {
                ssid: ssid.into(),
                password: password.into(),
                connection_timeout_ms: default_connection_timeout_ms(),
                auto_reconnect: default_auto_reconnect(),
            },
            platform: PlatformSection {
                base_url: base_url.into(),
                api_key: api_key.into(),
                http_timeout_ms: default_http_timeout_ms(),
                max_retries: default_max_retries(),
                retry_delay_ms: default_retry_delay_ms(),
                heartbeat_interval_ms: default_heartbeat_interval_ms(),
                max_consecutive_failures: default_max_consecutive_failures(),
            },
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.device.debug = debug;
        self
    }

    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wifi.connection_timeout_ms = timeout_ms;
        self
    }

    pub fn with_auto_reconnect(mut self, enable: bool) -> Self {
        self.wifi.auto_reconnect = enable;
        self
    }

    pub fn with_http_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.platform.http_timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.platform.max_retries = max_retries;
        self.platform.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.platform.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max_failures: u32) -> Self {
        self.platform.max_consecutive_failures = max_failures;
        self
    }

    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: NodeConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()
    }

    /// Replace secrets with values from the environment when present
    pub fn apply_env_overrides(&mut self) {
        if let Some(password) = Self::get_env_var_optional(WIFI_PASSWORD_ENV) {
            self.wifi.password = password;
        }
        if let Some(api_key) = Self::get_env_var_optional(API_KEY_ENV) {
            self.platform.api_key = api_key;
        }
    }

    fn get_env_var_optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    /// Check required fields and return the normalized configuration
    ///
    /// Trailing slashes are stripped from `base_url` and an empty device name
    /// falls back to [`DEFAULT_DEVICE_NAME`].
    pub fn validate(&self) -> Result<Self, ConfigError> {
        let mut normalized = self.clone();

        require_non_empty(&normalized.wifi.ssid, "wifi.ssid")?;
        require_non_empty(&normalized.wifi.password, "wifi.password")?;
        require_non_empty(&normalized.platform.api_key, "platform.api_key")?;
        require_non_empty(&normalized.platform.base_url, "platform.base_url")?;

        normalized.platform.base_url = normalize_base_url(&normalized.platform.base_url)?;

        if normalized.device.name.trim().is_empty() {
            normalized.device.name = default_device_name();
        }

        if normalized.platform.max_retries == 0 {
            return Err(ConfigError::InvalidValue(
                "platform.max_retries must be at least 1".to_string(),
            ));
        }
        if normalized.platform.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue(
                "platform.max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        Ok(normalized)
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.wifi.password = mask(&copy.wifi.password);
        copy.platform.api_key = mask(&copy.platform.api_key);
        copy
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
name = "probe"

[wifi]
ssid = "home"
password = "pw"

[platform]
base_url = "https://ex.test"
api_key = "k"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field));
    }
    Ok(())
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = NodeConfig::test_config();
        assert_eq!(config.device.name, "probe");
        assert!(!config.device.debug);
        assert_eq!(config.wifi.connection_timeout_ms, 30_000);
        assert!(config.wifi.auto_reconnect);
        assert_eq!(config.platform.http_timeout_ms, 15_000);
        assert_eq!(config.platform.max_retries, 3);
        assert_eq!(config.platform.retry_delay_ms, 2_000);
        assert_eq!(config.platform.heartbeat_interval_ms, 300_000);
        assert_eq!(config.platform.max_consecutive_failures, 5);
    }

    #[test]
    fn test_missing_device_section_uses_placeholder_name() {
        let config: NodeConfig = toml::from_str(
            r#"
[wifi]
ssid = "home"
password = "pw"

[platform]
base_url = "https://ex.test"
api_key = "k"
"#,
        )
        .unwrap();
        assert_eq!(config.device.name, DEFAULT_DEVICE_NAME);
    }

    #[test]
    fn test_validate_strips_trailing_slash() {
        let config = NodeConfig::new("home", "pw", "k", "https://ex.test///", "probe");
        let validated = config.validate().unwrap();
        assert_eq!(validated.platform.base_url, "https://ex.test");
    }

    #[test]
    fn test_validate_defaults_empty_device_name() {
        let config = NodeConfig::new("home", "pw", "k", "https://ex.test", "");
        let validated = config.validate().unwrap();
        assert_eq!(validated.device.name, DEFAULT_DEVICE_NAME);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let cases = [
            (NodeConfig::new("", "pw", "k", "https://ex.test", "d"), "wifi.ssid"),
            (NodeConfig::new("s", "", "k", "https://ex.test", "d"), "wifi.password"),
            (NodeConfig::new("s", "pw", "", "https://ex.test", "d"), "platform.api_key"),
            (NodeConfig::new("s", "pw", "k", "", "d"), "platform.base_url"),
        ];
        for (config, field) in cases {
            match config.validate() {
                Err(ConfigError::MissingField(name)) => assert_eq!(name, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        for url in ["not a url", "ftp://ex.test", "mailto:ops@ex.test"] {
            let config = NodeConfig::new("s", "pw", "k", url, "d");
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_zero_tunables() {
        let config = NodeConfig::new("s", "pw", "k", "https://ex.test", "d").with_retry(0, 10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        let config = NodeConfig::new("s", "pw", "k", "https://ex.test", "d")
            .with_max_consecutive_failures(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = NodeConfig::new("s", "pw", "k", "https://ex.test", "d")
            .with_debug(true)
            .with_connection_timeout_ms(1_000)
            .with_auto_reconnect(false)
            .with_http_timeout_ms(5_000)
            .with_retry(2, 10)
            .with_heartbeat_interval_ms(1_000)
            .with_max_consecutive_failures(3);
        assert!(config.device.debug);
        assert_eq!(config.wifi.connection_timeout_ms, 1_000);
        assert!(!config.wifi.auto_reconnect);
        assert_eq!(config.platform.http_timeout_ms, 5_000);
        assert_eq!(config.platform.max_retries, 2);
        assert_eq!(config.platform.retry_delay_ms, 10);
        assert_eq!(config.platform.heartbeat_interval_ms, 1_000);
        assert_eq!(config.platform.max_consecutive_failures, 3);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let config = NodeConfig::test_config().redacted();
        assert_eq!(config.wifi.password, "********");
        assert_eq!(config.platform.api_key, "********");
        assert_eq!(config.wifi.ssid, "home");
    }
}
