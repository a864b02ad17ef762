//! Configuration validation utilities.

use thiserror::Error;

/// Label names reserved for the measurement key columns.
pub const RESERVED_LABELS: [&str; 3] = ["target", "ip", "version"];

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Check that `name` is usable as a Prometheus label name.
///
/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*` and must not start with
/// `__`, which Prometheus reserves for internal use.
pub fn validate_label_name(name: &str) -> Result<(), ConfigError> {
    static LABEL_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = LABEL_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("failed to compile label regex")
    });

    if !regex.is_match(name) {
        return Err(ConfigError::ValidationError(format!(
            "invalid label name: '{name}'"
        )));
    }
    if name.starts_with("__") {
        return Err(ConfigError::ValidationError(format!(
            "label name '{name}' uses the reserved '__' prefix"
        )));
    }
    if RESERVED_LABELS.contains(&name) {
        return Err(ConfigError::ValidationError(format!(
            "label name '{name}' is reserved"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_label_names() {
        assert!(validate_label_name("env").is_ok());
        assert!(validate_label_name("_dc").is_ok());
        assert!(validate_label_name("rack_2").is_ok());
    }

    #[test]
    fn test_invalid_label_names() {
        assert!(validate_label_name("").is_err());
        assert!(validate_label_name("2fast").is_err());
        assert!(validate_label_name("with-dash").is_err());
        assert!(validate_label_name("has space").is_err());
        assert!(validate_label_name("__internal").is_err());
    }

    #[test]
    fn test_reserved_label_names() {
        for name in RESERVED_LABELS {
            let err = validate_label_name(name).unwrap_err();
            assert!(err.to_string().contains("reserved"));
        }
    }
}
