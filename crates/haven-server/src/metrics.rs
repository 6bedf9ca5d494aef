//! Metrics collection and export for Haven.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "haven_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "haven_connections_active";
    pub const EVENTS_TOTAL: &str = "haven_events_total";
    pub const ROOMS_ACTIVE: &str = "haven_rooms_active";
    pub const CALLS_ACTIVE: &str = "haven_calls_active";
    pub const CALLS_REAPED_TOTAL: &str = "haven_calls_reaped_total";
    pub const ERRORS_TOTAL: &str = "haven_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of events processed");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_gauge!(names::CALLS_ACTIVE, "Current number of live calls");
    metrics::describe_counter!(
        names::CALLS_REAPED_TOTAL,
        "Total number of stale calls removed by the reaper"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an event passing through the dispatcher.
pub fn record_event(direction: &str) {
    counter!(names::EVENTS_TOTAL, "direction" => direction.to_string()).increment(1);
}

/// Update live room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Update live call count.
pub fn set_active_calls(count: usize) {
    gauge!(names::CALLS_ACTIVE).set(count as f64);
}

/// Record stale calls removed by the reaper.
pub fn record_reaped(count: usize) {
    counter!(names::CALLS_REAPED_TOTAL).increment(count as u64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // Just test that it doesn't panic
        let _guard = ConnectionMetricsGuard::new();
    }
}
