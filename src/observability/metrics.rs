//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cfgstore_map_replace_total` (counter): namespace replaces by namespace, outcome
//! - `cfgstore_storage_failures_total` (counter): failed persistence by operation
//! - `cfgstore_plugin_reconcile_total` (counter): plugin list submissions by outcome
//! - `cfgstore_plugins_registered` (gauge): descriptors after the last reconcile
//! - `cfgstore_archive_duration_seconds` (histogram): backup/restore wall time
//! - `cfgstore_admin_requests_total` (counter): admin API requests by status
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests, CLI)
//! - The Prometheus exporter is optional and bound separately from the admin API

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_map_replace(namespace: &str, ok: bool) {
    counter!(
        "cfgstore_map_replace_total",
        "namespace" => namespace.to_string(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_storage_failure(operation: &'static str) {
    counter!("cfgstore_storage_failures_total", "operation" => operation).increment(1);
}

pub fn record_reconcile(outcome: &'static str, registered: usize) {
    counter!("cfgstore_plugin_reconcile_total", "outcome" => outcome).increment(1);
    if outcome == "ok" {
        gauge!("cfgstore_plugins_registered").set(registered as f64);
    }
}

pub fn record_archive(operation: &'static str, ok: bool, start: Instant) {
    histogram!(
        "cfgstore_archive_duration_seconds",
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_admin_request(method: &str, status: u16) {
    counter!(
        "cfgstore_admin_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
