//! Metrics collection and exposition.
//!
//! # Metrics
//! - `disburser_requests_total` (counter): HTTP requests by route, status
//! - `disburser_request_duration_seconds` (histogram): HTTP latency
//! - `disburser_dispatch_total` (counter): dispatch outcomes by category
//! - `disburser_probe_failures_total` (counter): failed probes by endpoint index
//! - `disburser_failovers_total` (counter): sweeps that moved off the last-known-good endpoint
//! - `disburser_active_endpoint` (gauge): index of the live endpoint, -1 when disconnected

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("disburser_requests_total", &labels).increment(1);
    histogram!("disburser_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Outcome labels: `confirmed`, `simulated`, or an error category.
pub fn record_dispatch(outcome: &'static str) {
    counter!("disburser_dispatch_total", "outcome" => outcome).increment(1);
}

pub fn record_probe_failure(index: usize) {
    counter!("disburser_probe_failures_total", "endpoint" => index.to_string()).increment(1);
}

pub fn record_failover(from: usize, to: usize) {
    counter!(
        "disburser_failovers_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_active_endpoint(index: Option<usize>) {
    gauge!("disburser_active_endpoint").set(index.map(|i| i as f64).unwrap_or(-1.0));
}
