//! Measurement key codec.
//!
//! The probe engine identifies every probed address by a single string key
//! of the form `"<target> <address> <v4|v6>"`, for example
//! `"test.host.com 192.168.2.1 v4"`. [`MeasurementKey`] is the typed form of
//! that string; `Display` encodes and `FromStr` decodes.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use strum_macros::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Errors produced when decoding a measurement key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The key does not consist of exactly three space-separated fields.
    #[error("malformed measurement key '{key}': expected 3 fields, found {fields}")]
    FieldCount { key: String, fields: usize },

    /// The address field is not an IP literal.
    #[error("malformed measurement key '{key}': invalid address '{address}'")]
    InvalidAddress { key: String, address: String },

    /// The family field is neither `v4` nor `v6`.
    #[error("malformed measurement key '{key}': unknown family '{family}'")]
    UnknownFamily { key: String, family: String },

    /// The family field disagrees with the address.
    #[error("malformed measurement key '{key}': address is not {family}")]
    FamilyMismatch { key: String, family: IpFamily },
}

/// IP address family of a resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Family of `addr`.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Tag used in keys and in the `version` label.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Identity of one probed address: logical target, resolved address, family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasurementKey {
    target: String,
    address: IpAddr,
    family: IpFamily,
}

impl MeasurementKey {
    /// Key for `address` resolved from `target`.
    ///
    /// `target` must not contain spaces; configuration validation enforces it.
    pub fn new(target: impl Into<String>, address: IpAddr) -> Self {
        Self {
            target: target.into(),
            family: IpFamily::of(&address),
            address,
        }
    }

    /// Logical target as configured.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolved address.
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Address family.
    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Base label values: target, address, family.
    pub fn label_values(&self) -> [String; 3] {
        [
            self.target.clone(),
            self.address.to_string(),
            self.family.as_str().to_string(),
        ]
    }
}

impl fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.address, self.family)
    }
}

impl FromStr for MeasurementKey {
    type Err = KeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = key.split(' ').collect();
        let [target, address, family] = parts[..] else {
            return Err(KeyError::FieldCount {
                key: key.to_string(),
                fields: parts.len(),
            });
        };

        let address: IpAddr = address.parse().map_err(|_| KeyError::InvalidAddress {
            key: key.to_string(),
            address: address.to_string(),
        })?;

        let family: IpFamily = family.parse().map_err(|_| KeyError::UnknownFamily {
            key: key.to_string(),
            family: family.to_string(),
        })?;

        if IpFamily::of(&address) != family {
            return Err(KeyError::FamilyMismatch {
                key: key.to_string(),
                family,
            });
        }

        Ok(Self {
            target: target.to_string(),
            address,
            family,
        })
    }
}

/// Encode `target` and `address` into a measurement key string.
pub fn encode(target: &str, address: IpAddr) -> String {
    MeasurementKey::new(target, address).to_string()
}

/// Decode a measurement key string.
pub fn decode(key: &str) -> Result<MeasurementKey, KeyError> {
    key.parse()
}
