//! Generation cycle metrics

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use promshard_core::ConfigKind;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Outcome label of a generation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    Partial,
    Aborted,
    Cancelled,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Partial => "partial",
            CycleOutcome::Aborted => "aborted",
            CycleOutcome::Cancelled => "cancelled",
        }
    }
}

/// Metrics shared by the caches of every kind
#[derive(Clone)]
pub struct GenerationMetrics {
    /// Cycles by kind and outcome
    pub cycles_total: IntCounterVec,

    /// Failed pools by kind and error category
    pub pool_failures_total: IntCounterVec,

    /// Documents held by the current generation
    pub documents: IntGaugeVec,

    /// Cycle duration in seconds
    pub cycle_duration_seconds: HistogramVec,

    /// Unix time of the last committed generation
    pub last_success_timestamp_seconds: GaugeVec,

    registry: Registry,
}

impl GenerationMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let metrics = Self {
            cycles_total: IntCounterVec::new(
                Opts::new("promshard_generation_cycles_total", "Generation cycles by outcome"),
                &["kind", "outcome"],
            )?,
            pool_failures_total: IntCounterVec::new(
                Opts::new(
                    "promshard_generation_pool_failures_total",
                    "Pools skipped during generation",
                ),
                &["kind", "category"],
            )?,
            documents: IntGaugeVec::new(
                Opts::new("promshard_generation_documents", "Documents in the current generation"),
                &["kind"],
            )?,
            cycle_duration_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "promshard_generation_cycle_duration_seconds",
                    "Duration of generation cycles",
                )
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
                &["kind"],
            )?,
            last_success_timestamp_seconds: GaugeVec::new(
                Opts::new(
                    "promshard_generation_last_success_timestamp_seconds",
                    "Unix time of the last committed generation",
                ),
                &["kind"],
            )?,
            registry: Registry::new(),
        };
        metrics.register(&metrics.registry)?;
        Ok(metrics)
    }

    /// Register all metrics with the given registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.cycles_total.clone()))?;
        registry.register(Box::new(self.pool_failures_total.clone()))?;
        registry.register(Box::new(self.documents.clone()))?;
        registry.register(Box::new(self.cycle_duration_seconds.clone()))?;
        registry.register(Box::new(self.last_success_timestamp_seconds.clone()))?;
        Ok(())
    }

    pub fn record_cycle(&self, kind: ConfigKind, outcome: CycleOutcome, elapsed: Duration) {
        let kind = kind.to_string();
        self.cycles_total
            .with_label_values(&[kind.as_str(), outcome.as_str()])
            .inc();
        self.cycle_duration_seconds
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_pool_failure(&self, kind: ConfigKind, category: &str) {
        self.pool_failures_total
            .with_label_values(&[kind.to_string().as_str(), category])
            .inc();
    }

    /// Record a committed generation
    pub fn record_commit(&self, kind: ConfigKind, documents: usize, at: SystemTime) {
        let kind = kind.to_string();
        self.documents
            .with_label_values(&[kind.as_str()])
            .set(documents as i64);
        let seconds = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        self.last_success_timestamp_seconds
            .with_label_values(&[kind.as_str()])
            .set(seconds);
    }

    /// Export the metrics in the Prometheus text format
    pub fn export_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode generation metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
