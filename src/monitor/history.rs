//! Rolling per-address result history.

use std::collections::VecDeque;
use std::time::Duration;

use super::engine::Metrics;

/// The last `capacity` probe results for one address; `None` marks a loss.
#[derive(Debug, Clone)]
pub struct History {
    results: VecDeque<Option<Duration>>,
    capacity: usize,
}

impl History {
    /// Create an empty history holding at most `capacity` results.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            results: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one result, evicting the oldest when full.
    pub fn push(&mut self, rtt: Option<Duration>) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(rtt);
    }

    /// Number of recorded results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no result was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Compute statistics over the current window.
    pub fn compute(&self) -> Metrics {
        let replies: Vec<f64> = self
            .results
            .iter()
            .flatten()
            .map(|rtt| rtt.as_nanos() as f64)
            .collect();

        let mut metrics = Metrics {
            packets_sent: self.results.len(),
            packets_lost: self.results.len() - replies.len(),
            ..Default::default()
        };
        if replies.is_empty() {
            return metrics;
        }

        let n = replies.len() as f64;
        let best = replies.iter().copied().fold(f64::INFINITY, f64::min);
        let worst = replies.iter().copied().fold(0.0, f64::max);
        let mean = replies.iter().sum::<f64>() / n;
        let variance = replies.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

        metrics.best = nanos(best);
        metrics.worst = nanos(worst);
        metrics.mean = nanos(mean);
        metrics.std_dev = nanos(variance.sqrt());
        metrics
    }
}

fn nanos(value: f64) -> Duration {
    Duration::from_nanos(value.round() as u64)
}
