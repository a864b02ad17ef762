//! Monitored target definition.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// A monitored target: a hostname or IP literal plus optional custom labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Hostname or IP literal to probe.
    pub address: String,
    /// Sparse custom labels exposed as extra metric columns.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl TargetConfig {
    /// Create a target without labels.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a custom label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// The address as an IP literal, if it is one.
    pub fn literal_ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_builder() {
        let target = TargetConfig::new("example.com")
            .with_label("env", "prod")
            .with_label("dc", "east");

        assert_eq!(target.address, "example.com");
        assert_eq!(target.labels.len(), 2);
        assert_eq!(target.labels["env"], "prod");
        assert!(target.literal_ip().is_none());
    }

    #[test]
    fn test_target_literal_ip() {
        assert_eq!(
            TargetConfig::new("::1").literal_ip(),
            Some(IpAddr::V6(std::net::Ipv6Addr::LOCALHOST))
        );
        assert!(TargetConfig::new("10.0.0.1").literal_ip().is_some());
    }

    #[test]
    fn test_target_labels_optional() {
        let target: TargetConfig = serde_yaml::from_str("address: 8.8.8.8").unwrap();
        assert!(target.labels.is_empty());
    }
}
