//! # Prometheus Metrics
//!
//! Exposes pgpilot's operational metrics in the Prometheus text exposition
//! format at `GET /metrics`.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `pgpilot_http_request_duration_seconds` | Histogram | `method`, `route`, `status` | API latency |
//! | `pgpilot_agent_iterations_total` | Counter | `status` | Agent iterations by reply status |
//! | `pgpilot_sql_statements_total` | Counter | `outcome` | Statements executed on target databases |
//! | `pgpilot_model_request_duration_seconds` | Histogram | `family` | Model backend latency |
//!
//! The registry is the only shared mutable state in the process; every
//! metric is atomic and safe to update from any task.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::executor::BatchResult;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    pub route: String,
    pub status: u16,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabel {
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabel {
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FamilyLabel {
    pub family: String,
}

fn latency_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 14))
}

pub struct Metrics {
    pub registry: Registry,
    pub http_duration: Family<HttpLabels, Histogram>,
    pub iterations: Family<StatusLabel, Counter>,
    pub statements: Family<OutcomeLabel, Counter>,
    pub model_duration: Family<FamilyLabel, Histogram>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_duration = Family::<HttpLabels, Histogram>::new_with_constructor(latency_histogram as fn() -> Histogram);
        registry.register(
            "pgpilot_http_request_duration_seconds",
            "HTTP request latency by route and status",
            http_duration.clone(),
        );

        let iterations = Family::<StatusLabel, Counter>::default();
        registry.register(
            "pgpilot_agent_iterations",
            "Agent iterations by reply status",
            iterations.clone(),
        );

        let statements = Family::<OutcomeLabel, Counter>::default();
        registry.register(
            "pgpilot_sql_statements",
            "SQL statements executed on target databases by outcome",
            statements.clone(),
        );

        let model_duration = Family::<FamilyLabel, Histogram>::new_with_constructor(latency_histogram as fn() -> Histogram);
        registry.register(
            "pgpilot_model_request_duration_seconds",
            "Model backend latency by vendor family",
            model_duration.clone(),
        );

        Self {
            registry,
            http_duration,
            iterations,
            statements,
            model_duration,
        }
    }

    pub fn observe_http(&self, method: &str, route: &str, status: u16, seconds: f64) {
        self.http_duration
            .get_or_create(&HttpLabels {
                method: method.to_string(),
                route: route.to_string(),
                status,
            })
            .observe(seconds);
    }

    pub fn count_iteration(&self, status: &str) {
        self.iterations
            .get_or_create(&StatusLabel {
                status: status.to_string(),
            })
            .inc();
    }

    /// Count a batch: successes, the failed statement, and statements
    /// rolled back along with it.
    pub fn count_batch(&self, batch: &BatchResult) {
        let mut bump = |outcome: &str, n: usize| {
            if n > 0 {
                self.statements
                    .get_or_create(&OutcomeLabel {
                        outcome: outcome.to_string(),
                    })
                    .inc_by(n as u64);
            }
        };
        let ok = batch.results.iter().filter(|r| r.success).count();
        let failed = batch.results.len() - ok;
        if batch.rolled_back == Some(true) {
            bump("rolled_back", ok);
        } else {
            bump("success", ok);
        }
        bump("error", failed);
    }

    pub fn observe_model(&self, family: &str, seconds: f64) {
        self.model_duration
            .get_or_create(&FamilyLabel {
                family: family.to_string(),
            })
            .observe(seconds);
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
