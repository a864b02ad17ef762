//! Custom label registry.
//!
//! Targets carry sparse label sets. [`CustomLabels`] folds them into a single
//! column schema: every key seen on any target, in first-seen order when
//! scanning the target list front to back. Targets missing a key export an
//! empty value in that column.

use std::collections::HashSet;

use crate::config::TargetConfig;

/// Ordered, deduplicated set of custom label keys across all targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomLabels {
    keys: Vec<String>,
}

impl CustomLabels {
    /// Build the registry from the configured targets.
    pub fn new(targets: &[TargetConfig]) -> Self {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();

        for target in targets {
            for key in target.labels.keys() {
                if seen.insert(key.as_str()) {
                    keys.push(key.clone());
                }
            }
        }

        Self { keys }
    }

    /// Label keys in column order.
    pub fn labels(&self) -> &[String] {
        &self.keys
    }

    /// Label values for `target`, one per column; missing keys are empty.
    pub fn values(&self, target: &TargetConfig) -> Vec<String> {
        self.keys
            .iter()
            .map(|key| target.labels.get(key).cloned().unwrap_or_default())
            .collect()
    }

    /// Number of custom label columns.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no target defines any custom label.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
