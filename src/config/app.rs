//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::target::TargetConfig;
use super::validation::{ConfigError, validate_label_name};

// =============================================================================
// Constants
// =============================================================================

/// Default interval between echo requests (5 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default echo reply timeout (4 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Default number of results remembered per address.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Default ICMP payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: u16 = 56;

/// Largest accepted ICMP payload size in bytes.
pub const MAX_PAYLOAD_SIZE: u16 = 65500;

/// Default DNS refresh interval (1 minute).
pub const DEFAULT_DNS_REFRESH: Duration = Duration::from_secs(60);

/// Default listen address for the metrics endpoint.
pub const DEFAULT_WEB_ADDRESS: &str = ":9113";

/// Default metrics path.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_history_size() -> usize {
    DEFAULT_HISTORY_SIZE
}

fn default_payload_size() -> u16 {
    DEFAULT_PAYLOAD_SIZE
}

fn default_dns_refresh() -> Duration {
    DEFAULT_DNS_REFRESH
}

// =============================================================================
// Ping Configuration
// =============================================================================

/// Probe parameters shared by every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Interval between echo requests (default: 5s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Echo reply timeout (default: 4s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Number of results to remember per address (default: 10).
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// ICMP payload size in bytes (default: 56).
    #[serde(default = "default_payload_size")]
    pub payload_size: u16,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            history_size: DEFAULT_HISTORY_SIZE,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

// =============================================================================
// DNS Configuration
// =============================================================================

/// Target name resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Interval for re-resolving targets; zero disables refresh (default: 1m).
    #[serde(default = "default_dns_refresh", with = "humantime_serde")]
    pub refresh: Duration,

    /// Nameserver used instead of the system resolver, e.g. `1.1.1.1` or
    /// `10.0.0.53:5353`.
    #[serde(default)]
    pub name_server: Option<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_DNS_REFRESH,
            name_server: None,
        }
    }
}

// =============================================================================
// Web Configuration
// =============================================================================

/// Metrics endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address; `:port` binds all interfaces (default: ":9113").
    pub address: String,

    /// Path under which metrics are exposed (default: "/metrics").
    pub metrics_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_WEB_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

impl WebConfig {
    /// Listen address with the `:port` shorthand expanded to `0.0.0.0:port`.
    pub fn bind_address(&self) -> String {
        if self.address.starts_with(':') {
            format!("0.0.0.0{}", self.address)
        } else {
            self.address.clone()
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Monitored targets, in the order their label columns are discovered.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    /// Probe parameters.
    #[serde(default)]
    pub ping: PingConfig,

    /// Name resolution settings.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Metrics endpoint settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Labels attached to every exported sample.
    #[serde(default)]
    pub global_labels: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping.history_size < 1 {
            return Err(ConfigError::ValidationError(
                "ping.history_size must be greater than 0".to_string(),
            ));
        }

        if self.ping.payload_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "ping.payload_size must be between 0 and {MAX_PAYLOAD_SIZE}"
            )));
        }

        if self.ping.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "ping.interval must be non-zero".to_string(),
            ));
        }

        if self.ping.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "ping.timeout must be non-zero".to_string(),
            ));
        }

        if self.targets.is_empty() {
            return Err(ConfigError::ValidationError(
                "no targets specified".to_string(),
            ));
        }

        for target in &self.targets {
            if target.address.is_empty() {
                return Err(ConfigError::ValidationError(
                    "target address cannot be empty".to_string(),
                ));
            }
            // The address is the first field of the space-delimited measurement key
            if target.address.contains(char::is_whitespace) {
                return Err(ConfigError::ValidationError(format!(
                    "target address '{}' must not contain whitespace",
                    target.address
                )));
            }
        }

        for key in self.global_labels.keys() {
            validate_label_name(key).map_err(|e| {
                ConfigError::ValidationError(format!("global_labels: {e}"))
            })?;
        }

        let mut custom_keys = HashSet::new();
        for target in &self.targets {
            for key in target.labels.keys() {
                if !custom_keys.insert(key.as_str()) {
                    continue;
                }
                validate_label_name(key).map_err(|e| {
                    ConfigError::ValidationError(format!("target '{}': {e}", target.address))
                })?;
                if self.global_labels.contains_key(key) {
                    return Err(ConfigError::ValidationError(format!(
                        "label '{key}' is defined both globally and on target '{}'",
                        target.address
                    )));
                }
            }
        }

        if self.web.address.is_empty() {
            return Err(ConfigError::ValidationError(
                "web.address cannot be empty".to_string(),
            ));
        }

        validate_metrics_path(&self.web.metrics_path)?;

        Ok(())
    }

}

/// The metrics path must be a static route: absolute, without the route
/// parameter syntax (`:name`, `*rest`, `{name}`) and not `/healthz`.
fn validate_metrics_path(path: &str) -> Result<(), ConfigError> {
    let is_param = |segment: &str| segment.starts_with(':') || segment.starts_with('*');
    if !path.starts_with('/')
        || path == "/healthz"
        || path.contains(['{', '}'])
        || path.split('/').any(is_param)
    {
        return Err(ConfigError::ValidationError(format!(
            "invalid web.metrics_path: '{path}'"
        )));
    }
    Ok(())
}
