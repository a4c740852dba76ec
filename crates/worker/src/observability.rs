use std::sync::OnceLock;

use anyhow::Result;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const EVENTS_DISPATCHED_TOTAL: &str = "gacp_worker_events_dispatched_total";
const QUEUE_READY_GAUGE: &str = "gacp_worker_queue_ready_total";
const QUEUE_PROCESSING_GAUGE: &str = "gacp_worker_queue_processing_total";
const QUEUE_ERRORS_TOTAL: &str = "gacp_worker_queue_errors_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn register_event_dispatched(action: &str, to_state: &str) {
    counter!(
        EVENTS_DISPATCHED_TOTAL,
        "action" => action.to_string(),
        "to_state" => to_state.to_string()
    )
    .increment(1);
}

pub fn register_queue_error() {
    counter!(QUEUE_ERRORS_TOTAL).increment(1);
}

pub fn set_queue_depth_gauge(ready: u64, processing: u64) {
    gauge!(QUEUE_READY_GAUGE).set(ready as f64);
    gauge!(QUEUE_PROCESSING_GAUGE).set(processing as f64);
}
