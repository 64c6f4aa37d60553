//! Source loading metrics: per-year files loaded, skipped, and rows read.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct SourcesMetrics;

impl SourcesMetrics {
    pub fn record_loaded(kind: &str, rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "sources", "loaded"), "kind" => kind.to_string())
            .increment(1);
        ::metrics::counter!(phase_metric!(counter, "sources", "rows_read"), "kind" => kind.to_string())
            .increment(rows as u64);
    }

    /// A year left out because its source did not match the declared schema.
    pub fn record_skipped(kind: &str) {
        ::metrics::counter!(phase_metric!(counter, "sources", "skipped"), "kind" => kind.to_string())
            .increment(1);
    }
}

impl PhaseMetrics for SourcesMetrics {
    fn register_metrics() {
        super::describe(&Self::metrics_documentation());
    }

    fn phase_name() -> &'static str {
        "sources"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "sources", "loaded"),
                metric_type: MetricType::Counter,
                help: "Source files loaded and normalized",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "rows_read"),
                metric_type: MetricType::Counter,
                help: "Data rows read from source files",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "skipped"),
                metric_type: MetricType::Counter,
                help: "Source files skipped on a schema mismatch",
            },
        ]
    }
}
