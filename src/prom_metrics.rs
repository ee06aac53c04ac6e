//! # Prometheus Metrics: Exposition for Container Orchestration
//!
//! Exposes queue metrics in the Prometheus text exposition format.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tourline_registrations_total` | Counter |: | Entrants registered |
//! | `tourline_advances_total` | Counter | `trigger` | Entrants passed by "Next" or countdown |
//! | `tourline_waiting_entrants` | Gauge |: | Current waiting line length |
//! | `tourline_passed_entrants` | Gauge |: | Current passed list length |
//! | `tourline_persist_failures_total` | Counter |: | Snapshot writes that failed |
//! | `tourline_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//!
//! Gauges are refreshed after every committed command and status query.
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// What caused an entrant to be passed.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct AdvanceLabel {
    pub trigger: String,
}

impl AdvanceLabel {
    pub fn manual() -> Self {
        AdvanceLabel {
            trigger: "manual".into(),
        }
    }

    pub fn timer() -> Self {
        AdvanceLabel {
            trigger: "timer".into(),
        }
    }
}

/// Label set for HTTP request duration.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

type HistogramCtor = fn() -> Histogram;

fn http_histogram() -> Histogram {
    // 1ms .. ~8s
    Histogram::new(exponential_buckets(0.001, 2.0, 14))
}

/// Thread-safe metrics registry for the queue service.
pub struct Metrics {
    pub registry: Registry,
    pub registrations: Counter,
    pub advances: Family<AdvanceLabel, Counter>,
    pub waiting_entrants: Gauge,
    pub passed_entrants: Gauge,
    pub persist_failures: Counter,
    pub http_request_duration: Family<HttpLabel, Histogram, HistogramCtor>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let registrations = Counter::default();
        registry.register(
            "tourline_registrations",
            "Entrants registered",
            registrations.clone(),
        );

        let advances = Family::<AdvanceLabel, Counter>::default();
        registry.register(
            "tourline_advances",
            "Entrants passed, by trigger",
            advances.clone(),
        );

        let waiting_entrants = Gauge::default();
        registry.register(
            "tourline_waiting_entrants",
            "Entrants currently waiting",
            waiting_entrants.clone(),
        );

        let passed_entrants = Gauge::default();
        registry.register(
            "tourline_passed_entrants",
            "Entrants currently in the passed list",
            passed_entrants.clone(),
        );

        let persist_failures = Counter::default();
        registry.register(
            "tourline_persist_failures",
            "Queue snapshot writes that failed",
            persist_failures.clone(),
        );

        let http_request_duration =
            Family::<HttpLabel, Histogram, HistogramCtor>::new_with_constructor(http_histogram);
        registry.register(
            "tourline_http_request_duration_seconds",
            "HTTP request duration",
            http_request_duration.clone(),
        );

        Self {
            registry,
            registrations,
            advances,
            waiting_entrants,
            passed_entrants,
            persist_failures,
            http_request_duration,
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::warn!(error = %e, "metrics encoding failed");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_returns_valid_text() {
        let m = Metrics::new();
        m.registrations.inc();
        m.advances.get_or_create(&AdvanceLabel::timer()).inc();
        let text = m.encode();
        assert!(text.contains("tourline_registrations_total 1"));
        assert!(text.contains("trigger=\"timer\""));
        assert!(text.contains("# EOF"));
    }

    #[test]
    fn metrics_default_values_are_zero() {
        let m = Metrics::new();
        assert_eq!(m.registrations.get(), 0);
        assert_eq!(m.waiting_entrants.get(), 0);
        assert_eq!(m.persist_failures.get(), 0);
    }

    #[test]
    fn advance_triggers_counted_independently() {
        let m = Metrics::new();
        m.advances.get_or_create(&AdvanceLabel::manual()).inc();
        m.advances.get_or_create(&AdvanceLabel::manual()).inc();
        m.advances.get_or_create(&AdvanceLabel::timer()).inc();
        assert_eq!(m.advances.get_or_create(&AdvanceLabel::manual()).get(), 2);
        assert_eq!(m.advances.get_or_create(&AdvanceLabel::timer()).get(), 1);
    }
}
