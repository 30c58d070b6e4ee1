//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_proxy_requests_total` (counter): proxied requests by category, status
//! - `relay_tcp_connections_total` (counter): accepted relay connections by port
//! - `relay_bytes_total` (counter): forwarded bytes by protocol, port, direction
//! - `relay_udp_dropped_total` (counter): host datagrams with no learned client
//! - `relay_active_connections` (gauge): live connections by component
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter is opt-in via `observability.metrics_address`

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Count one proxied request.
pub fn record_proxy_request(category: &'static str, status: u16) {
    counter!("relay_proxy_requests_total", "category" => category, "status" => status.to_string())
        .increment(1);
}

/// Count one accepted TCP relay connection.
pub fn record_tcp_connection(port: u16) {
    counter!("relay_tcp_connections_total", "port" => port.to_string()).increment(1);
}

/// Count forwarded payload bytes.
pub fn record_bytes(protocol: &'static str, port: u16, direction: &'static str, bytes: usize) {
    counter!(
        "relay_bytes_total",
        "protocol" => protocol,
        "port" => port.to_string(),
        "direction" => direction
    )
    .increment(bytes as u64);
}

/// Count a host datagram dropped because no client has been learned yet.
pub fn record_udp_dropped(port: u16) {
    counter!("relay_udp_dropped_total", "port" => port.to_string()).increment(1);
}

pub fn set_active_connections(component: &'static str, active: u64) {
    gauge!("relay_active_connections", "component" => component).set(active as f64);
}
