//! ICMP probe engine backed by `surge-ping`.
//!
//! Every registered address gets its own Tokio task that sends one echo
//! request per interval and records the outcome into a rolling [`History`](super::History).

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::engine::{EngineError, ProbeEngine, Snapshot};
use super::table::{SharedHistory, TargetTable};
use crate::config::{DEFAULT_HISTORY_SIZE, DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, DEFAULT_TIMEOUT};
use crate::key::IpFamily;

/// IP families usable for probing on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Families {
    pub v4: bool,
    pub v6: bool,
}

impl Families {
    /// Both families enabled.
    pub const ALL: Self = Self { v4: true, v6: true };

    /// Whether `family` is enabled.
    pub fn supports(&self, family: IpFamily) -> bool {
        match family {
            IpFamily::V4 => self.v4,
            IpFamily::V6 => self.v6,
        }
    }
}

/// Engine-wide probe parameters, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorOptions {
    pub families: Families,
    pub interval: Duration,
    pub timeout: Duration,
    pub history_size: usize,
    pub payload_size: u16,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            families: Families::ALL,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            history_size: DEFAULT_HISTORY_SIZE,
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// ICMP probe engine.
pub struct Monitor {
    client_v4: Option<Client>,
    client_v6: Option<Client>,
    options: MonitorOptions,
    payload: Arc<[u8]>,
    targets: TargetTable,
    shutdown: CancellationToken,
}

impl Monitor {
    /// Open ICMP clients for the enabled families.
    ///
    /// A family whose socket cannot be opened (e.g. missing privileges) is
    /// disabled with a warning; construction fails only if none remains.
    /// Must be called from within a Tokio runtime.
    pub fn new(options: MonitorOptions) -> Result<Self, EngineError> {
        let client_v4 = if options.families.v4 {
            usable_client(IpFamily::V4)
        } else {
            None
        };
        let client_v6 = if options.families.v6 {
            usable_client(IpFamily::V6)
        } else {
            None
        };

        if client_v4.is_none() && client_v6.is_none() {
            return Err(EngineError::NoFamilies);
        }

        tracing::info!(
            v4 = client_v4.is_some(),
            v6 = client_v6.is_some(),
            interval = ?options.interval,
            timeout = ?options.timeout,
            history_size = options.history_size,
            payload_size = options.payload_size,
            "ICMP monitor created"
        );

        Ok(Self {
            client_v4,
            client_v6,
            payload: vec![0u8; usize::from(options.payload_size)].into(),
            options,
            targets: TargetTable::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Number of registered keys.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Token cancelled when the monitor stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop all probe tasks.
    pub fn stop(&self) {
        self.shutdown.cancel();
        tracing::info!("ICMP monitor stopped");
    }

    fn client(&self, family: IpFamily) -> Option<&Client> {
        match family {
            IpFamily::V4 => self.client_v4.as_ref(),
            IpFamily::V6 => self.client_v6.as_ref(),
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("options", &self.options)
            .field("target_count", &self.target_count())
            .finish_non_exhaustive()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl ProbeEngine for Monitor {
    fn register(
        &self,
        key: &str,
        address: IpAddr,
        start_delay: Duration,
    ) -> Result<(), EngineError> {
        let family = IpFamily::of(&address);
        let client = self
            .client(family)
            .cloned()
            .ok_or(EngineError::UnsupportedFamily(family))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let history = self.targets.insert(key, self.options.history_size)?;

        let task = ProbeTask {
            key: key.to_string(),
            address,
            client,
            timeout: self.options.timeout,
            interval: self.options.interval,
            payload: Arc::clone(&self.payload),
            history,
        };
        runtime.spawn(task.run(start_delay, self.shutdown.clone()));

        tracing::debug!(key = %key, start_delay = ?start_delay, "Target registered");
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.targets.contains(key)
    }

    fn export(&self) -> Snapshot {
        self.targets.export()
    }
}

fn open_client(family: IpFamily) -> Result<Client, EngineError> {
    let config = match family {
        IpFamily::V4 => Config::default(),
        IpFamily::V6 => Config::builder().kind(ICMP::V6).build(),
    };
    Ok(Client::new(&config)?)
}

/// Open a client for `family`, or disable the family with a warning.
fn usable_client(family: IpFamily) -> Option<Client> {
    match open_client(family) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(family = %family, error = %e, "Disabling IP family");
            None
        }
    }
}

/// Probe loop state for one registered address.
struct ProbeTask {
    key: String,
    address: IpAddr,
    client: Client,
    timeout: Duration,
    interval: Duration,
    payload: Arc<[u8]>,
    history: SharedHistory,
}

impl ProbeTask {
    async fn run(self, start_delay: Duration, shutdown: CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(start_delay) => {}
        }

        let mut pinger = self
            .client
            .pinger(self.address, PingIdentifier(rand::random()))
            .await;
        pinger.timeout(self.timeout);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut seq: u16 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let rtt = match pinger.ping(PingSequence(seq), &self.payload).await {
                Ok((_, rtt)) => Some(rtt),
                Err(e) => {
                    tracing::debug!(key = %self.key, seq, error = %e, "Echo request failed");
                    None
                }
            };
            seq = seq.wrapping_add(1);
            self.history.lock().push(rtt);
        }

        tracing::debug!(key = %self.key, "Probe task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families_supports() {
        let only_v4 = Families { v4: true, v6: false };
        assert!(only_v4.supports(IpFamily::V4));
        assert!(!only_v4.supports(IpFamily::V6));
        assert!(Families::ALL.supports(IpFamily::V6));
    }

    #[test]
    fn test_monitor_options_default() {
        let options = MonitorOptions::default();
        assert_eq!(options.interval, DEFAULT_INTERVAL);
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.history_size, DEFAULT_HISTORY_SIZE);
        assert_eq!(options.payload_size, DEFAULT_PAYLOAD_SIZE);
    }

    fn v4_only() -> MonitorOptions {
        MonitorOptions {
            families: Families {
                v4: true,
                v6: false,
            },
            interval: Duration::from_secs(60),
            ..Default::default()
        }
    }

    // Needs an ICMP socket (CAP_NET_RAW or ping_group_range)
    #[tokio::test]
    #[ignore]
    async fn test_register_rejects_disabled_family() {
        let monitor = Monitor::new(v4_only()).unwrap();
        let addr: IpAddr = "2001:db8::1".parse().unwrap();

        let err = monitor
            .register("h 2001:db8::1 v6", addr, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFamily(IpFamily::V6)));
        assert!(!monitor.contains("h 2001:db8::1 v6"));
        assert_eq!(monitor.target_count(), 0);
    }

    // Needs an ICMP socket (CAP_NET_RAW or ping_group_range)
    #[tokio::test]
    #[ignore]
    async fn test_register_contains_and_duplicate() {
        let monitor = Monitor::new(v4_only()).unwrap();
        let addr: IpAddr = "127.0.0.1".parse().unwrap();
        // Long start delay keeps the history empty
        let delay = Duration::from_secs(3600);

        monitor.register("lo 127.0.0.1 v4", addr, delay).unwrap();
        assert!(monitor.contains("lo 127.0.0.1 v4"));
        assert!(matches!(
            monitor.register("lo 127.0.0.1 v4", addr, delay),
            Err(EngineError::DuplicateKey(_))
        ));
        assert_eq!(monitor.target_count(), 1);
        assert!(monitor.export().is_empty());

        monitor.stop();
    }

    #[test]
    fn test_register_outside_runtime() {
        // Client creation needs a runtime; registration checks its own
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let Ok(monitor) = runtime.block_on(async { Monitor::new(v4_only()) }) else {
            return;
        };
        let err = monitor
            .register("lo 127.0.0.1 v4", "127.0.0.1".parse().unwrap(), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoRuntime));
        assert!(!monitor.contains("lo 127.0.0.1 v4"));
    }

    #[tokio::test]
    async fn test_monitor_without_families() {
        let options = MonitorOptions {
            families: Families {
                v4: false,
                v6: false,
            },
            ..Default::default()
        };
        assert!(matches!(
            Monitor::new(options),
            Err(EngineError::NoFamilies)
        ));
    }
}
