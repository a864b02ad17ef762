//! Probe engine trait and exported statistics.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::key::IpFamily;

/// Point-in-time statistics for every registered measurement key.
pub type Snapshot = HashMap<String, Metrics>;

/// Errors returned by a probe engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to open an ICMP socket.
    #[error("failed to create ICMP client: {0}")]
    Client(#[from] std::io::Error),

    /// No address family could be opened for probing.
    #[error("no usable IP family for ICMP probing")]
    NoFamilies,

    /// The address family of a target is not enabled.
    #[error("{0} probing is not available")]
    UnsupportedFamily(IpFamily),

    /// A target with the same key is already registered.
    #[error("target '{0}' is already registered")]
    DuplicateKey(String),

    /// Registration happened outside of a Tokio runtime.
    #[error("no Tokio runtime available to run probes")]
    NoRuntime,
}

/// Round-trip statistics over one address' rolling history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    /// Fastest reply.
    pub best: Duration,
    /// Slowest reply.
    pub worst: Duration,
    /// Mean reply time.
    pub mean: Duration,
    /// Population standard deviation of reply times.
    pub std_dev: Duration,
    /// Echo requests in the history window.
    pub packets_sent: usize,
    /// Echo requests without a reply in the history window.
    pub packets_lost: usize,
}

impl Metrics {
    /// Whether at least one echo request was answered.
    pub fn has_replies(&self) -> bool {
        self.packets_sent > self.packets_lost
    }

    /// Fraction of echo requests lost; NaN when nothing was sent yet.
    pub fn loss_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return f64::NAN;
        }
        self.packets_lost as f64 / self.packets_sent as f64
    }
}

/// Background measurement engine keyed by measurement key strings.
///
/// Implementations probe each registered address on their own schedule and
/// hand out independent copies of their statistics on [`export`].
///
/// [`export`]: ProbeEngine::export
pub trait ProbeEngine: Send + Sync + 'static {
    /// Start probing `address` under `key` after `start_delay`.
    fn register(&self, key: &str, address: IpAddr, start_delay: Duration)
    -> Result<(), EngineError>;

    /// Whether `key` is already registered.
    fn contains(&self, key: &str) -> bool;

    /// Snapshot of all keys with at least one result. May be empty.
    fn export(&self) -> Snapshot;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_ratio() {
        let all_ok = Metrics {
            packets_sent: 10,
            ..Default::default()
        };
        assert_eq!(all_ok.loss_ratio(), 0.0);
        assert!(all_ok.has_replies());

        let all_lost = Metrics {
            packets_sent: 10,
            packets_lost: 10,
            ..Default::default()
        };
        assert_eq!(all_lost.loss_ratio(), 1.0);
        assert!(!all_lost.has_replies());

        let partial = Metrics {
            packets_sent: 4,
            packets_lost: 1,
            ..Default::default()
        };
        assert_eq!(partial.loss_ratio(), 0.25);
    }

    #[test]
    fn test_loss_ratio_nothing_sent() {
        let metrics = Metrics::default();
        assert!(metrics.loss_ratio().is_nan());
        assert!(!metrics.has_replies());
    }
}
