//! Metrics collection and exposition.
//!
//! # Metrics
//! - `polyserve_bind_total` (counter): bind outcomes by service, outcome
//! - `polyserve_services_bound` (gauge): services currently bound
//! - `polyserve_connections_active` (gauge): open connections by service
//! - `polyserve_stream_frames_total` (counter): frames moved through content streams
//! - `polyserve_stream_closed_total` (counter): stream closures by reason
//! - `polyserve_datagrams_total` (counter): datagrams received by service
//!
//! Recording without an installed recorder is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_bind(service: &str, bound: bool) {
    let outcome = if bound { "success" } else { "failure" };
    counter!("polyserve_bind_total", "service" => service.to_string(), "outcome" => outcome)
        .increment(1);
    if bound {
        gauge!("polyserve_services_bound").increment(1.0);
    }
}

pub fn record_connection_opened(service: &str) {
    gauge!("polyserve_connections_active", "service" => service.to_string()).increment(1.0);
}

pub fn record_connection_closed(service: &str) {
    gauge!("polyserve_connections_active", "service" => service.to_string()).decrement(1.0);
}

pub fn record_stream_frame(direction: &'static str) {
    counter!("polyserve_stream_frames_total", "direction" => direction).increment(1);
}

pub fn record_stream_closed(reason: &'static str) {
    counter!("polyserve_stream_closed_total", "reason" => reason).increment(1);
}

pub fn record_datagram(service: &str) {
    counter!("polyserve_datagrams_total", "service" => service.to_string()).increment(1);
}
