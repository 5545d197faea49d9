use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::git::MirrorStep;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RelayLabels {
    pub outcome: RelayOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum RelayOutcome {
    Dispatched,
    BadInput,
    InternalError,
    DispatchFailed,
    Unauthorized,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SyncLabels {
    pub outcome: SyncOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum SyncOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StepLabels {
    pub step: StepLabel,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum StepLabel {
    ConfigureTransport,
    Clone,
    SetPushUrl,
    Push,
}

impl From<MirrorStep> for StepLabel {
    fn from(step: MirrorStep) -> Self {
        match step {
            MirrorStep::ConfigureTransport => Self::ConfigureTransport,
            MirrorStep::Clone => Self::Clone,
            MirrorStep::SetPushUrl => Self::SetPushUrl,
            MirrorStep::Push => Self::Push,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the service.
pub struct Metrics {
    pub relay_requests_total: Family<RelayLabels, Counter>,
    pub sync_total: Family<SyncLabels, Counter>,
    pub sync_duration_seconds: Histogram,
    pub git_step_failures_total: Family<StepLabels, Counter>,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let relay_requests_total = Family::<RelayLabels, Counter>::default();
        registry.register(
            "mirror_relay_relay_requests",
            "Webhook relay requests by outcome",
            relay_requests_total.clone(),
        );

        let sync_total = Family::<SyncLabels, Counter>::default();
        registry.register(
            "mirror_relay_sync",
            "Sync worker invocations by outcome",
            sync_total.clone(),
        );

        let sync_duration_seconds = Histogram::new(exponential_buckets(0.5, 2.0, 12));
        registry.register(
            "mirror_relay_sync_duration_seconds",
            "Sync worker invocation latency in seconds",
            sync_duration_seconds.clone(),
        );

        let git_step_failures_total = Family::<StepLabels, Counter>::default();
        registry.register(
            "mirror_relay_git_step_failures",
            "Mirror sequence git steps that exited non-zero or failed to spawn",
            git_step_failures_total.clone(),
        );

        Self {
            relay_requests_total,
            sync_total,
            sync_duration_seconds,
            git_step_failures_total,
        }
    }

    pub fn record_relay(&self, outcome: RelayOutcome) {
        self.relay_requests_total
            .get_or_create(&RelayLabels { outcome })
            .inc();
    }

    pub fn record_sync(&self, outcome: SyncOutcome, seconds: f64) {
        self.sync_total.get_or_create(&SyncLabels { outcome }).inc();
        self.sync_duration_seconds.observe(seconds);
    }

    pub fn record_step_failure(&self, step: MirrorStep) {
        self.git_step_failures_total
            .get_or_create(&StepLabels { step: step.into() })
            .inc();
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in [`crate::AppState`].
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl MetricsRegistry {
    /// Build a fresh registry and pre-register all service metrics.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
