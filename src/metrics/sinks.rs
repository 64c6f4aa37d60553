//! Persistence metrics.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct SinkMetrics;

impl SinkMetrics {
    pub fn record_persisted(sink: &'static str, relations: usize, rows: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "sink", "relations_written"), "sink" => sink)
            .increment(relations as u64);
        ::metrics::counter!(phase_metric!(counter, "sink", "rows_written"), "sink" => sink)
            .increment(rows as u64);
        ::metrics::histogram!(phase_metric!(histogram, "sink", "persist_duration_seconds"), "sink" => sink)
            .record(duration_secs);
    }
}

impl PhaseMetrics for SinkMetrics {
    fn register_metrics() {
        super::describe(&Self::metrics_documentation());
    }

    fn phase_name() -> &'static str {
        "sink"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "sink", "relations_written"),
                metric_type: MetricType::Counter,
                help: "Relations persisted",
            },
            MetricDoc {
                name: phase_metric!(counter, "sink", "rows_written"),
                metric_type: MetricType::Counter,
                help: "Rows persisted across all relations",
            },
            MetricDoc {
                name: phase_metric!(histogram, "sink", "persist_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent in one all-or-nothing persist call",
            },
        ]
    }
}
