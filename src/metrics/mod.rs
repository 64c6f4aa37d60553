//! Run metrics for the dataset pipeline
//!
//! Each pipeline phase defines its metrics in a dedicated submodule. The
//! Prometheus recorder is installed without an HTTP listener: a batch run
//! renders the snapshot in-process and writes it next to its outputs.

pub mod registry;
pub mod sinks;
pub mod sources;
pub mod stages;

pub use sinks::SinkMetrics;
pub use sources::SourcesMetrics;
pub use stages::StageMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use tracing::{debug, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("metrics handle was already set");
            }
            registry::register_all_metrics();
            debug!("prometheus recorder installed");
        }
        Err(e) => warn!("failed to install prometheus recorder: {}", e),
    });
}

/// Prometheus text snapshot of everything recorded so far, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Implemented by each phase's metric collection.
pub trait PhaseMetrics {
    /// Describe every metric of the phase to the recorder.
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Metric names follow `esc_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("esc_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("esc_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Describe a phase's metrics to the installed recorder.
pub(crate) fn describe(docs: &[MetricDoc]) {
    for doc in docs {
        match doc.metric_type {
            MetricType::Counter => ::metrics::describe_counter!(doc.name, doc.help),
            MetricType::Histogram => ::metrics::describe_histogram!(doc.name, doc.help),
        }
    }
}
