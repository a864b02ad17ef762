//! Monitor bootstrap.
//!
//! Turns the target list into probe engine registrations: detect the usable
//! IP families, build the [`Monitor`], resolve every target and register
//! each resolved address under its measurement key. Failures for a single
//! target or address are logged and skipped so the rest keep being probed.

use std::net::{Ipv4Addr, Ipv6Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, PingConfig, TargetConfig};
use crate::key;
use crate::monitor::{EngineError, Families, Monitor, MonitorOptions, ProbeEngine};
use crate::resolver::{ResolveError, Resolver, resolver_for};

/// Start offset step between consecutive targets.
const TARGET_STAGGER_MS: u64 = 10;

/// Errors that prevent the monitor from starting at all.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The probe engine could not be created.
    #[error("cannot start monitoring: {0}")]
    Engine(#[from] EngineError),

    /// The configured resolver could not be created.
    #[error("cannot create resolver: {0}")]
    Resolver(#[from] ResolveError),
}

/// Outcome of one registration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Keys newly registered with the engine.
    pub registered: Vec<String>,
    /// Keys that were already registered.
    pub existing: Vec<String>,
    /// Targets that failed to resolve or resolved to nothing.
    pub unresolved: Vec<String>,
    /// Keys the engine refused.
    pub failed: Vec<String>,
}

/// A running monitor together with the resolver used to feed it.
pub struct Bootstrapped {
    pub monitor: Arc<Monitor>,
    pub resolver: Arc<dyn Resolver>,
    pub report: RegistrationReport,
}

/// Detect which IP families can be used by binding loopback listeners.
pub fn local_families() -> Families {
    let v4 = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).is_ok();
    let v6 = TcpListener::bind((Ipv6Addr::LOCALHOST, 0)).is_ok();
    tracing::debug!(v4, v6, "Detected local IP families");
    Families { v4, v6 }
}

/// Engine parameters from the ping configuration.
pub fn monitor_options(config: &PingConfig, families: Families) -> MonitorOptions {
    MonitorOptions {
        families,
        interval: config.interval,
        timeout: config.timeout,
        history_size: config.history_size,
        payload_size: config.payload_size,
    }
}

/// Start offset for the `address_index`-th address of the `target_index`-th
/// target, so first probes are spread out instead of fired at once.
pub fn start_delay(target_index: usize, address_index: usize) -> Duration {
    Duration::from_millis(TARGET_STAGGER_MS * target_index as u64 + address_index as u64)
}

/// Build the monitor, resolve all targets and register their addresses.
///
/// Must be called from within a Tokio runtime.
pub async fn bootstrap(config: &AppConfig) -> Result<Bootstrapped, BootstrapError> {
    let resolver = resolver_for(&config.dns)?;
    let monitor = Arc::new(Monitor::new(monitor_options(
        &config.ping,
        local_families(),
    ))?);

    tracing::info!(resolver = resolver.name(), targets = config.targets.len(), "Registering targets");
    let report = register_targets(monitor.as_ref(), resolver.as_ref(), &config.targets).await;
    tracing::info!(
        registered = report.registered.len(),
        unresolved = report.unresolved.len(),
        failed = report.failed.len(),
        "Target registration complete"
    );

    Ok(Bootstrapped {
        monitor,
        resolver,
        report,
    })
}

/// Resolve every target in order and register addresses not yet known.
///
/// Targets are processed sequentially; a slow lookup delays the ones after
/// it. Already registered keys are left untouched.
pub async fn register_targets(
    engine: &dyn ProbeEngine,
    resolver: &dyn Resolver,
    targets: &[TargetConfig],
) -> RegistrationReport {
    register_matching(engine, resolver, targets, |_| true).await
}

/// Periodically re-resolve hostname targets and register new addresses.
///
/// Literal IP targets are skipped. Registrations are add-only: addresses
/// that disappear from DNS keep their existing key. Returns `None` when
/// `refresh` is zero.
pub fn spawn_dns_refresh(
    engine: Arc<dyn ProbeEngine>,
    resolver: Arc<dyn Resolver>,
    targets: Vec<TargetConfig>,
    refresh: Duration,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if refresh.is_zero() {
        return None;
    }

    let handle = tokio::spawn(async move {
        let start = tokio::time::Instant::now() + refresh;
        let mut ticker = tokio::time::interval_at(start, refresh);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let report = register_matching(engine.as_ref(), resolver.as_ref(), &targets, |t| {
                t.literal_ip().is_none()
            })
            .await;
            if report.registered.is_empty() {
                tracing::debug!("DNS refresh found no new addresses");
            } else {
                tracing::info!(added = ?report.registered, "DNS refresh registered new addresses");
            }
        }

        tracing::debug!("DNS refresh stopped");
    });

    Some(handle)
}

/// Registration pass over the targets accepted by `include`.
///
/// Start offsets use each target's position in the full list.
async fn register_matching(
    engine: &dyn ProbeEngine,
    resolver: &dyn Resolver,
    targets: &[TargetConfig],
    include: impl Fn(&TargetConfig) -> bool,
) -> RegistrationReport {
    let mut report = RegistrationReport::default();

    for (i, target) in targets.iter().enumerate() {
        if !include(target) {
            continue;
        }

        let lookup = match target.literal_ip() {
            Some(ip) => Ok(vec![ip]),
            None => resolver.lookup(&target.address).await,
        };
        let addrs = match lookup {
            Ok(addrs) if addrs.is_empty() => {
                tracing::error!(host = %target.address, "Target resolved to no addresses");
                report.unresolved.push(target.address.clone());
                continue;
            }
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::error!(host = %target.address, error = %e, "Cannot resolve target address");
                report.unresolved.push(target.address.clone());
                continue;
            }
        };

        for (j, addr) in addrs.into_iter().enumerate() {
            let key = key::encode(&target.address, addr);
            if engine.contains(&key) {
                report.existing.push(key);
                continue;
            }

            match engine.register(&key, addr, start_delay(i, j)) {
                Ok(()) => report.registered.push(key),
                Err(e) => {
                    tracing::error!(host = %target.address, key = %key, error = %e, "Cannot add target");
                    report.failed.push(key);
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Snapshot;
    use crate::resolver::SystemResolver;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::net::IpAddr;

    /// Records registrations; refuses keys listed in `reject`.
    #[derive(Default)]
    struct RecordingEngine {
        registrations: Mutex<Vec<(String, IpAddr, Duration)>>,
        reject: Vec<String>,
    }

    impl ProbeEngine for RecordingEngine {
        fn register(
            &self,
            key: &str,
            address: IpAddr,
            start_delay: Duration,
        ) -> Result<(), EngineError> {
            if self.reject.iter().any(|k| k == key) {
                return Err(EngineError::UnsupportedFamily(crate::key::IpFamily::of(
                    &address,
                )));
            }
            self.registrations
                .lock()
                .push((key.to_string(), address, start_delay));
            Ok(())
        }

        fn contains(&self, key: &str) -> bool {
            self.registrations.lock().iter().any(|(k, _, _)| k == key)
        }

        fn export(&self) -> Snapshot {
            Snapshot::new()
        }
    }

    /// Resolves from a fixed table; unknown hosts fail.
    struct TableResolver {
        table: Mutex<HashMap<String, Vec<IpAddr>>>,
    }

    impl TableResolver {
        fn new(entries: &[(&str, &[&str])]) -> Self {
            let table = entries
                .iter()
                .map(|(host, ips)| {
                    (
                        host.to_string(),
                        ips.iter().map(|ip| ip.parse().unwrap()).collect(),
                    )
                })
                .collect();
            Self {
                table: Mutex::new(table),
            }
        }

        fn set(&self, host: &str, ips: &[&str]) {
            self.table.lock().insert(
                host.to_string(),
                ips.iter().map(|ip| ip.parse().unwrap()).collect(),
            );
        }
    }

    #[async_trait::async_trait]
    impl Resolver for TableResolver {
        async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
            self.table.lock().get(host).cloned().ok_or_else(|| {
                ResolveError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such host",
                ))
            })
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    #[test]
    fn test_start_delay() {
        assert_eq!(start_delay(0, 0), Duration::ZERO);
        assert_eq!(start_delay(0, 1), Duration::from_millis(1));
        assert_eq!(start_delay(3, 2), Duration::from_millis(32));
    }

    #[test]
    fn test_monitor_options_from_config() {
        let config = PingConfig {
            interval: Duration::from_secs(1),
            timeout: Duration::from_millis(800),
            history_size: 3,
            payload_size: 16,
        };
        let families = Families {
            v4: true,
            v6: false,
        };
        let options = monitor_options(&config, families);
        assert_eq!(options.families, families);
        assert_eq!(options.interval, Duration::from_secs(1));
        assert_eq!(options.timeout, Duration::from_millis(800));
        assert_eq!(options.history_size, 3);
        assert_eq!(options.payload_size, 16);
    }

    #[tokio::test]
    async fn test_register_targets_staggered() {
        let engine = RecordingEngine::default();
        let resolver = TableResolver::new(&[
            ("a.example", &["10.0.0.1", "2001:db8::1"]),
            ("b.example", &["10.0.0.2"]),
        ]);
        let targets = vec![
            TargetConfig::new("a.example"),
            TargetConfig::new("b.example"),
        ];

        let report = register_targets(&engine, &resolver, &targets).await;
        assert_eq!(
            report.registered,
            [
                "a.example 10.0.0.1 v4",
                "a.example 2001:db8::1 v6",
                "b.example 10.0.0.2 v4"
            ]
        );

        let delays: Vec<Duration> = engine
            .registrations
            .lock()
            .iter()
            .map(|(_, _, d)| *d)
            .collect();
        assert_eq!(
            delays,
            [
                Duration::from_millis(0),
                Duration::from_millis(1),
                Duration::from_millis(10)
            ]
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_target() {
        let engine = RecordingEngine::default();
        let resolver = TableResolver::new(&[("good", &["192.0.2.1"]), ("empty", &[])]);
        let targets = vec![
            TargetConfig::new("missing"),
            TargetConfig::new("empty"),
            TargetConfig::new("good"),
        ];

        let report = register_targets(&engine, &resolver, &targets).await;
        assert_eq!(report.unresolved, ["missing", "empty"]);
        assert_eq!(report.registered, ["good 192.0.2.1 v4"]);
        // Offsets keep the target's position in the list
        assert_eq!(
            engine.registrations.lock()[0].2,
            Duration::from_millis(20)
        );
    }

    #[tokio::test]
    async fn test_registration_failure_is_isolated() {
        let engine = RecordingEngine {
            reject: vec!["dual 2001:db8::5 v6".to_string()],
            ..Default::default()
        };
        let resolver = TableResolver::new(&[("dual", &["2001:db8::5", "192.0.2.5"])]);

        let report = register_targets(&engine, &resolver, &[TargetConfig::new("dual")]).await;
        assert_eq!(report.failed, ["dual 2001:db8::5 v6"]);
        assert_eq!(report.registered, ["dual 192.0.2.5 v4"]);
    }

    #[tokio::test]
    async fn test_register_targets_skips_existing() {
        let engine = RecordingEngine::default();
        let targets = vec![TargetConfig::new("127.0.0.1"), TargetConfig::new("127.0.0.1")];

        let report = register_targets(&engine, &SystemResolver, &targets).await;
        assert_eq!(report.registered, ["127.0.0.1 127.0.0.1 v4"]);
        assert_eq!(report.existing, ["127.0.0.1 127.0.0.1 v4"]);
    }

    /// Fails every lookup.
    struct FailingResolver;

    #[async_trait::async_trait]
    impl Resolver for FailingResolver {
        async fn lookup(&self, _: &str) -> Result<Vec<IpAddr>, ResolveError> {
            Err(ResolveError::Io(std::io::Error::other("resolver unavailable")))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_literal_targets_skip_resolver() {
        let engine = RecordingEngine::default();
        let targets = vec![
            TargetConfig::new("192.0.2.9"),
            TargetConfig::new("host.example"),
            TargetConfig::new("2001:db8::9"),
        ];

        let report = register_targets(&engine, &FailingResolver, &targets).await;
        assert_eq!(
            report.registered,
            ["192.0.2.9 192.0.2.9 v4", "2001:db8::9 2001:db8::9 v6"]
        );
        assert_eq!(report.unresolved, ["host.example"]);
        assert_eq!(
            engine.registrations.lock()[1].2,
            Duration::from_millis(20)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dns_refresh_adds_new_addresses() {
        let engine = Arc::new(RecordingEngine::default());
        let resolver = Arc::new(TableResolver::new(&[("svc", &["10.1.0.1"])]));
        let targets = vec![TargetConfig::new("svc"), TargetConfig::new("192.0.2.9")];

        register_targets(engine.as_ref(), resolver.as_ref(), &targets).await;
        assert_eq!(engine.registrations.lock().len(), 2);

        resolver.set("svc", &["10.1.0.1", "10.1.0.2"]);
        let shutdown = CancellationToken::new();
        let handle = spawn_dns_refresh(
            engine.clone(),
            resolver.clone(),
            targets,
            Duration::from_secs(60),
            shutdown.clone(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let keys: Vec<String> = engine
            .registrations
            .lock()
            .iter()
            .map(|(k, _, _)| k.clone())
            .collect();
        assert_eq!(
            keys,
            [
                "svc 10.1.0.1 v4",
                "192.0.2.9 192.0.2.9 v4",
                "svc 10.1.0.2 v4"
            ]
        );
        assert_eq!(engine.registrations.lock()[2].2, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_dns_refresh_disabled() {
        let handle = spawn_dns_refresh(
            Arc::new(RecordingEngine::default()),
            Arc::new(SystemResolver),
            vec![TargetConfig::new("example.com")],
            Duration::ZERO,
            CancellationToken::new(),
        );
        assert!(handle.is_none());
    }
}
