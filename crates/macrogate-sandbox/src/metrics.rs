//! Prometheus metrics for macro executions.
//!
//! Only compiled with the `metrics` feature.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

/// Label set for execution metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    /// `success`, `rejected`, `error` or `timeout`.
    pub outcome: String,
}

/// Label set for error metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// The sandbox error code, e.g. `SCRIPT_ERROR`.
    pub code: String,
}

/// Prometheus metrics for the macro sandbox.
pub struct SandboxMetrics {
    /// Execution attempts by outcome.
    pub executions_total: Family<OutcomeLabels, Counter>,
    /// Execution duration in seconds, by outcome.
    pub execution_duration_seconds: Family<OutcomeLabels, Histogram>,
    /// Failures by error code.
    pub errors_total: Family<ErrorLabels, Counter>,
}

impl SandboxMetrics {
    /// Create the metrics and register them with `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let executions_total = Family::default();
        registry.register(
            "macrogate_executions_total",
            "Macro execution attempts",
            executions_total.clone(),
        );

        let execution_duration_seconds =
            Family::<OutcomeLabels, Histogram>::new_with_constructor(|| {
                Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0].into_iter())
            });
        registry.register(
            "macrogate_execution_duration_seconds",
            "Macro execution duration",
            execution_duration_seconds.clone(),
        );

        let errors_total = Family::default();
        registry.register(
            "macrogate_errors_total",
            "Macro execution failures by code",
            errors_total.clone(),
        );

        Self {
            executions_total,
            execution_duration_seconds,
            errors_total,
        }
    }

    /// Record one execution attempt.
    pub fn record_execution(&self, outcome: &str, duration_secs: f64) {
        let labels = OutcomeLabels {
            outcome: outcome.to_string(),
        };
        self.executions_total.get_or_create(&labels).inc();
        self.execution_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failure.
    pub fn record_error(&self, code: &str) {
        let labels = ErrorLabels {
            code: code.to_string(),
        };
        self.errors_total.get_or_create(&labels).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;
    use std::sync::Arc;

    use crate::capability::CapabilitySet;
    use crate::executor::{SandboxConfig, SandboxExecutor};
    use crate::validator::SecurityPolicy;

    #[test]
    fn counters_increment_per_label() {
        let mut registry = Registry::default();
        let metrics = SandboxMetrics::new(&mut registry);
        metrics.record_execution("success", 0.5);
        metrics.record_execution("success", 1.0);
        metrics.record_execution("rejected", 0.1);
        metrics.record_error("VALIDATION_FAILED");

        let success = OutcomeLabels {
            outcome: "success".into(),
        };
        assert_eq!(metrics.executions_total.get_or_create(&success).get(), 2);
        let code = ErrorLabels {
            code: "VALIDATION_FAILED".into(),
        };
        assert_eq!(metrics.errors_total.get_or_create(&code).get(), 1);
    }

    #[test]
    fn executor_records_outcomes() {
        let mut registry = Registry::default();
        let metrics = Arc::new(SandboxMetrics::new(&mut registry));
        let exec = SandboxExecutor::new(
            SandboxConfig::default(),
            Arc::new(SecurityPolicy::default()),
            Arc::new(CapabilitySet::standard()),
        )
        .with_metrics(metrics.clone());

        exec.execute("result = 1", &serde_json::Map::new()).unwrap();
        exec.execute("import os", &serde_json::Map::new()).unwrap_err();

        let mut buf = String::new();
        encode(&mut buf, &registry).unwrap();
        assert!(buf.contains("macrogate_executions_total"), "{buf}");
        assert!(buf.contains("VALIDATION_FAILED"), "{buf}");
    }
}
