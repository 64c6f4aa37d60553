//! Registration of every phase's metrics, with name-conflict detection.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::sources::SourcesMetrics>(&mut all_metrics);
    register_phase_metrics::<super::stages::StageMetrics>(&mut all_metrics);
    register_phase_metrics::<super::sinks::SinkMetrics>(&mut all_metrics);

    debug!("registered {} metrics across all phases", all_metrics.len());
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, (&'static str, MetricDoc)>) {
    T::register_metrics();
    let phase_name = T::phase_name();
    for doc in T::metrics_documentation() {
        if let Some((owner, _)) = all_metrics.get(doc.name) {
            warn!(
                "metric name conflict: '{}' is defined by both '{}' and '{}'",
                doc.name, owner, phase_name
            );
        } else {
            all_metrics.insert(doc.name, (phase_name, doc));
        }
    }
}
