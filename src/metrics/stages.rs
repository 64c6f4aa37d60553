//! Per-stage metrics of a pipeline run.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct StageMetrics;

impl StageMetrics {
    pub fn record_stage(stage: &'static str, rows_out: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "stage", "runs"), "stage" => stage).increment(1);
        ::metrics::counter!(phase_metric!(counter, "stage", "rows_out"), "stage" => stage)
            .increment(rows_out as u64);
        ::metrics::histogram!(phase_metric!(histogram, "stage", "duration_seconds"), "stage" => stage)
            .record(duration_secs);
    }

    pub fn record_failure(stage: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "stage", "failures"), "stage" => stage).increment(1);
    }
}

impl PhaseMetrics for StageMetrics {
    fn register_metrics() {
        super::describe(&Self::metrics_documentation());
    }

    fn phase_name() -> &'static str {
        "stage"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "stage", "runs"),
                metric_type: MetricType::Counter,
                help: "Completed pipeline stages",
            },
            MetricDoc {
                name: phase_metric!(counter, "stage", "rows_out"),
                metric_type: MetricType::Counter,
                help: "Rows produced by each stage",
            },
            MetricDoc {
                name: phase_metric!(histogram, "stage", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of each stage",
            },
            MetricDoc {
                name: phase_metric!(counter, "stage", "failures"),
                metric_type: MetricType::Counter,
                help: "Stages that aborted the run",
            },
        ]
    }
}
