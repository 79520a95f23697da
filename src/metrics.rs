//! Probe metrics recorded through the `metrics` facade
//!
//! Nothing is exported unless a recorder is installed, e.g. with
//! [`install_prometheus_exporter`].

use crate::result::{ErrorKind, LinkResult};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

pub fn record_link(result: &LinkResult, duration: Duration) {
    let outcome = if result.passed { "passed" } else { "failed" };
    let kind = result
        .error
        .as_ref()
        .map(|e| error_label(e.error_type))
        .unwrap_or("none");

    counter!("linkprobe_links_checked_total", "outcome" => outcome, "error_type" => kind)
        .increment(1);
    histogram!("linkprobe_link_check_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_retry() {
    counter!("linkprobe_link_retries_total").increment(1);
}

pub fn record_screenshot_upload(success: bool) {
    let outcome = if success { "uploaded" } else { "failed" };
    counter!("linkprobe_screenshots_total", "outcome" => outcome).increment(1);
}

pub fn record_run(passed: bool, duration: Duration) {
    let outcome = if passed { "passed" } else { "failed" };
    counter!("linkprobe_runs_total", "outcome" => outcome).increment(1);
    histogram!("linkprobe_run_duration_seconds").record(duration.as_secs_f64());
}

pub fn set_active_tabs(count: usize) {
    gauge!("linkprobe_active_tabs").set(count as f64);
}

fn error_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NavigationError => "navigation",
        ErrorKind::StatusMismatchError => "status_mismatch",
        ErrorKind::TimeoutError => "timeout",
        ErrorKind::StorageValidationError => "storage_validation",
        ErrorKind::BucketCreationError => "bucket_creation",
        ErrorKind::ScreenshotFileUploadError => "screenshot_upload",
        ErrorKind::GenericError => "generic",
    }
}

/// Serves `/metrics` in Prometheus text format on `addr`.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!("Prometheus metrics available on http://{}/metrics", addr);
    Ok(())
}
