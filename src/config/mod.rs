//! Configuration module for pingscope.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Targets (address plus optional custom labels)
//! - Probe settings (interval, timeout, history size, payload size)
//! - DNS settings (refresh interval, nameserver)
//! - Web settings (listen address, metrics path) and global labels

mod app;
mod target;
mod validation;

pub use app::{AppConfig, DnsConfig, PingConfig, WebConfig};
pub use target::TargetConfig;
pub use validation::{ConfigError, RESERVED_LABELS, validate_label_name};

// Re-export constants
pub use app::{
    DEFAULT_DNS_REFRESH, DEFAULT_HISTORY_SIZE, DEFAULT_INTERVAL, DEFAULT_METRICS_PATH,
    DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT, DEFAULT_WEB_ADDRESS, MAX_PAYLOAD_SIZE,
};
