//! Pingscope - ICMP latency exporter for Prometheus
//!
//! This crate provides the core functionality of the pingscope exporter.
//! It can be used as a library by other Rust projects, or run as a standalone
//! binary with the `pingscope` executable.
//!
//! # Architecture
//!
//! - **Config**: YAML targets, probe settings and global labels
//! - **Monitor**: Background ICMP probing with rolling history per address
//! - **Bootstrap**: Target resolution, staggered registration and DNS refresh
//! - **Exporter**: Prometheus collector joining statistics with labels
//! - **Server**: `/metrics` and `/healthz` over HTTP
//!
//! # Example
//!
//! ```rust,ignore
//! use pingscope::{AppConfig, PingExporter, bootstrap};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("configs/config.yaml")?;
//!     let started = bootstrap(&config).await?;
//!
//!     let registry = prometheus::Registry::new();
//!     registry.register(Box::new(PingExporter::new(started.monitor, &config)?))?;
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod exporter;
pub mod key;
pub mod labels;
pub mod monitor;
pub mod resolver;
pub mod server;

pub use bootstrap::{
    BootstrapError, Bootstrapped, RegistrationReport, bootstrap, register_targets,
    spawn_dns_refresh,
};
pub use config::{AppConfig, ConfigError, DnsConfig, PingConfig, TargetConfig, WebConfig};
pub use exporter::{Gauge, PingExporter, Sample};
pub use key::{IpFamily, KeyError, MeasurementKey};
pub use labels::CustomLabels;
pub use monitor::{EngineError, Metrics, Monitor, MonitorOptions, ProbeEngine, Snapshot};
pub use resolver::{NameServerResolver, ResolveError, Resolver, SystemResolver};
pub use server::{AppState, ServerError, create_router};
