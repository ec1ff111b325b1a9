//! # Prometheus Metrics
//!
//! Operation counters for scenario replay. Rendered in the Prometheus text
//! exposition format when `replay --metrics` is given.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Holds all Prometheus metric handles for a replay.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Committed operations, by operation name.
    pub operations_committed_total: IntCounterVec,
    /// Rejected operations, by operation name and error kind.
    pub operations_rejected_total: IntCounterVec,
    /// Issuances created across all instruments.
    pub issuances_created_total: IntCounter,
    /// Instruments activated by the scenario.
    pub instruments_active: IntGauge,
    /// Wall-clock time spent executing each step.
    pub step_duration_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("fsp".into()), None)?;

        let operations_committed_total = IntCounterVec::new(
            Opts::new("operations_committed_total", "Operations committed by instrument managers"),
            &["op"],
        )?;
        registry.register(Box::new(operations_committed_total.clone()))?;

        let operations_rejected_total = IntCounterVec::new(
            Opts::new("operations_rejected_total", "Operations rejected by instrument managers"),
            &["op", "kind"],
        )?;
        registry.register(Box::new(operations_rejected_total.clone()))?;

        let issuances_created_total =
            IntCounter::new("issuances_created_total", "Total number of issuances created")?;
        registry.register(Box::new(issuances_created_total.clone()))?;

        let instruments_active =
            IntGauge::new("instruments_active", "Number of activated instruments")?;
        registry.register(Box::new(instruments_active.clone()))?;

        let step_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("step_duration_seconds", "Scenario step execution time in seconds")
                .buckets(vec![0.00001, 0.0001, 0.001, 0.01, 0.1, 1.0]),
        )?;
        registry.register(Box::new(step_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_committed_total,
            operations_rejected_total,
            issuances_created_total,
            instruments_active,
            step_duration_seconds,
        })
    }

    pub fn record_committed(&self, op: &str) {
        self.operations_committed_total.with_label_values(&[op]).inc();
        if op == "create" {
            self.issuances_created_total.inc();
        }
    }

    pub fn record_rejected(&self, op: &str, kind: &str) {
        self.operations_rejected_total
            .with_label_values(&[op, kind])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_labels() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_committed("create");
        metrics.record_committed("engage");
        metrics.record_rejected("create", "validation");
        metrics.instruments_active.set(2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("fsp_operations_committed_total{op=\"create\"} 1"));
        assert!(text.contains("fsp_operations_rejected_total{kind=\"validation\",op=\"create\"} 1"));
        assert!(text.contains("fsp_issuances_created_total 1"));
        assert!(text.contains("fsp_instruments_active 2"));
    }
}
