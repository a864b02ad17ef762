//! Probe Engine
//!
//! Background ICMP measurement keyed by measurement key strings. Each
//! registered address runs in its own Tokio task and keeps a rolling
//! history of round-trip times.
//!
//! # Architecture
//!
//! - [`ProbeEngine`]: seam between bootstrap/exporter and the engine
//! - [`Monitor`]: `surge-ping` implementation
//! - [`Metrics`] / [`Snapshot`]: exported per-key statistics

mod engine;
mod history;
mod pinger;
mod table;

pub use engine::{EngineError, Metrics, ProbeEngine, Snapshot};
pub use history::History;
pub use pinger::{Families, Monitor, MonitorOptions};
pub use table::{SharedHistory, TargetTable};
