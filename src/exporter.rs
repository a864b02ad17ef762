//! Prometheus collector for probe statistics.
//!
//! [`PingExporter`] is invoked on every scrape. It pulls a snapshot from the
//! probe engine, decodes each measurement key and emits one gauge sample per
//! statistic with the label columns
//! `target, ip, version, <global labels sorted>, <custom labels>`.
//!
//! The column schema is fixed at construction. If the engine exports an
//! empty snapshot, the previous one is served again.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};

use crate::config::{AppConfig, RESERVED_LABELS};
use crate::key::{self, MeasurementKey};
use crate::labels::CustomLabels;
use crate::monitor::{Metrics, ProbeEngine, Snapshot};

/// Metric name prefix.
pub const NAMESPACE: &str = "ping";

/// Gauges exported per measurement key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gauge {
    RttBest,
    RttWorst,
    RttMean,
    RttStdDev,
    LossRatio,
}

impl Gauge {
    /// All gauges in descriptor order.
    pub const ALL: [Gauge; 5] = [
        Gauge::RttBest,
        Gauge::RttWorst,
        Gauge::RttMean,
        Gauge::RttStdDev,
        Gauge::LossRatio,
    ];

    /// Metric name without namespace.
    pub fn name(self) -> &'static str {
        match self {
            Gauge::RttBest => "rtt_best_ms",
            Gauge::RttWorst => "rtt_worst_ms",
            Gauge::RttMean => "rtt_mean_ms",
            Gauge::RttStdDev => "rtt_std_dev_ms",
            Gauge::LossRatio => "loss_ratio",
        }
    }

    /// Help text.
    pub fn help(self) -> &'static str {
        match self {
            Gauge::RttBest => "Best round trip time in milliseconds",
            Gauge::RttWorst => "Worst round trip time in milliseconds",
            Gauge::RttMean => "Mean round trip time in milliseconds",
            Gauge::RttStdDev => "Standard deviation of round trip time in milliseconds",
            Gauge::LossRatio => "Packets lost / packets sent; NaN for an entry with no packets sent",
        }
    }

    fn opts(self) -> Opts {
        Opts::new(self.name(), self.help()).namespace(NAMESPACE)
    }
}

/// One gauge value with its full label vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub gauge: Gauge,
    pub labels: Vec<String>,
    pub value: f64,
}

/// Scrape-time collector composing engine statistics with configured labels.
pub struct PingExporter {
    engine: Arc<dyn ProbeEngine>,
    label_names: Vec<String>,
    global_values: Vec<String>,
    custom_labels: CustomLabels,
    /// Custom label values of the first configured target per address.
    custom_values: HashMap<String, Vec<String>>,
    descs: Vec<Desc>,
    snapshot: ArcSwap<Snapshot>,
    decode_errors: AtomicU64,
}

impl PingExporter {
    /// Build the collector and fix its label schema.
    ///
    /// # Errors
    /// Returns `prometheus::Error` if a label name is invalid or repeated.
    pub fn new(engine: Arc<dyn ProbeEngine>, config: &AppConfig) -> prometheus::Result<Self> {
        // BTreeMap keys iterate sorted; the order is captured once here
        let global_keys: Vec<String> = config.global_labels.keys().cloned().collect();
        let global_values: Vec<String> = config.global_labels.values().cloned().collect();
        let custom_labels = CustomLabels::new(&config.targets);

        let label_names: Vec<String> = RESERVED_LABELS
            .iter()
            .map(|name| name.to_string())
            .chain(global_keys)
            .chain(custom_labels.labels().iter().cloned())
            .collect();

        let descs = Gauge::ALL
            .iter()
            .map(|gauge| {
                Desc::new(
                    format!("{NAMESPACE}_{}", gauge.name()),
                    gauge.help().to_string(),
                    label_names.clone(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        let mut custom_values = HashMap::new();
        for target in &config.targets {
            custom_values
                .entry(target.address.clone())
                .or_insert_with(|| custom_labels.values(target));
        }

        Ok(Self {
            engine,
            label_names,
            global_values,
            custom_labels,
            custom_values,
            descs,
            snapshot: ArcSwap::from_pointee(Snapshot::new()),
            decode_errors: AtomicU64::new(0),
        })
    }

    /// Label column names in order.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Measurement keys skipped because they could not be decoded.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Refresh the cached snapshot from the engine and compute all samples.
    pub fn scrape(&self) -> Vec<Sample> {
        let snapshot = self.refresh();
        self.samples(&snapshot)
    }

    /// Store a non-empty export; an empty one keeps the previous snapshot.
    fn refresh(&self) -> Arc<Snapshot> {
        let export = self.engine.export();
        if !export.is_empty() {
            self.snapshot.store(Arc::new(export));
        }
        self.snapshot.load_full()
    }

    fn samples(&self, snapshot: &Snapshot) -> Vec<Sample> {
        let ordered: BTreeMap<&String, &Metrics> = snapshot.iter().collect();
        let mut samples = Vec::with_capacity(ordered.len() * Gauge::ALL.len());

        for (raw_key, metrics) in ordered {
            let key = match key::decode(raw_key) {
                Ok(key) => key,
                Err(e) => {
                    self.decode_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(key = %raw_key, error = %e, "Skipping undecodable measurement key");
                    continue;
                }
            };
            let labels = self.label_values(&key);

            if metrics.has_replies() {
                let rtts = [
                    (Gauge::RttBest, metrics.best),
                    (Gauge::RttWorst, metrics.worst),
                    (Gauge::RttMean, metrics.mean),
                    (Gauge::RttStdDev, metrics.std_dev),
                ];
                for (gauge, rtt) in rtts {
                    samples.push(Sample {
                        gauge,
                        labels: labels.clone(),
                        value: millis(rtt),
                    });
                }
            }

            samples.push(Sample {
                gauge: Gauge::LossRatio,
                labels,
                value: metrics.loss_ratio(),
            });
        }

        samples
    }

    fn label_values(&self, key: &MeasurementKey) -> Vec<String> {
        let mut values = Vec::with_capacity(self.label_names.len());
        values.extend(key.label_values());
        values.extend(self.global_values.iter().cloned());
        match self.custom_values.get(key.target()) {
            Some(custom) => values.extend(custom.iter().cloned()),
            None => values.resize(self.label_names.len(), String::new()),
        }
        debug_assert_eq!(values.len(), self.label_names.len());
        values
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

impl std::fmt::Debug for PingExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingExporter")
            .field("label_names", &self.label_names)
            .field("custom_labels", &self.custom_labels.len())
            .finish_non_exhaustive()
    }
}

impl Collector for PingExporter {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let names: Vec<&str> = self.label_names.iter().map(String::as_str).collect();
        let mut vecs = Vec::with_capacity(Gauge::ALL.len());
        for gauge in Gauge::ALL {
            match GaugeVec::new(gauge.opts(), &names) {
                Ok(vec) => vecs.push((gauge, vec)),
                Err(e) => {
                    tracing::error!(metric = gauge.name(), error = %e, "Failed to build gauge");
                    return Vec::new();
                }
            }
        }

        for sample in self.scrape() {
            let Some((_, vec)) = vecs.iter().find(|(gauge, _)| *gauge == sample.gauge) else {
                continue;
            };
            let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
            match vec.get_metric_with_label_values(&values) {
                Ok(metric) => metric.set(sample.value),
                Err(e) => {
                    tracing::error!(metric = sample.gauge.name(), error = %e, "Failed to set gauge");
                }
            }
        }

        vecs.iter()
            .flat_map(|(_, vec)| vec.collect())
            .filter(|family| !family.get_metric().is_empty())
            .collect()
    }
}
