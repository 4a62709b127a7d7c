//! Metrics collection and export for Tutorline.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};
use tutorline_core::HubHandle;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tutorline_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "tutorline_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "tutorline_connections_rejected_total";
    pub const HUB_CONNECTIONS: &str = "tutorline_hub_connections";
    pub const HUB_ROOMS: &str = "tutorline_hub_rooms";
    pub const MESSAGES_DELIVERED: &str = "tutorline_messages_delivered_total";
    pub const EVICTIONS_TOTAL: &str = "tutorline_evictions_total";
    pub const LOGINS_TOTAL: &str = "tutorline_logins_total";
    pub const ERRORS_TOTAL: &str = "tutorline_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of WebSocket connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open WebSocket connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "WebSocket upgrades refused, by reason"
    );
    metrics::describe_gauge!(
        names::HUB_CONNECTIONS,
        "Connections registered with the hub"
    );
    metrics::describe_gauge!(names::HUB_ROOMS, "Rooms with at least one live subscriber");
    metrics::describe_counter!(
        names::MESSAGES_DELIVERED,
        "Messages pushed into connection outboxes"
    );
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Connections evicted because their outbox was full or closed"
    );
    metrics::describe_counter!(names::LOGINS_TOTAL, "Login attempts, by outcome");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors, by kind");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Mirror hub statistics into gauges until the hub stops.
pub fn spawn_hub_sampler(hub: HubHandle, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        let mut delivered = 0u64;
        let mut evicted = 0u64;

        loop {
            ticker.tick().await;
            let Ok(stats) = hub.stats().await else {
                debug!("Hub closed, stopping sampler");
                break;
            };

            gauge!(names::HUB_CONNECTIONS).set(stats.connections as f64);
            gauge!(names::HUB_ROOMS).set(stats.rooms as f64);
            counter!(names::MESSAGES_DELIVERED)
                .increment(stats.delivered_total.saturating_sub(delivered));
            counter!(names::EVICTIONS_TOTAL).increment(stats.evicted_total.saturating_sub(evicted));
            delivered = stats.delivered_total;
            evicted = stats.evicted_total;
        }
    });
}

/// Record a refused upgrade.
pub fn record_rejection(reason: &'static str) {
    counter!(names::CONNECTIONS_REJECTED, "reason" => reason).increment(1);
}

/// Record a login attempt.
pub fn record_login(outcome: &'static str) {
    counter!(names::LOGINS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record an error.
pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
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
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorline_core::{Hub, HubConfig};

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; recording must still be harmless.
        let _guard = ConnectionMetricsGuard::new();
        record_rejection("test");
        record_error("test");
    }

    #[tokio::test]
    async fn test_sampler_stops_with_hub() {
        let (hub, handle) = Hub::new(HubConfig::default());
        drop(hub);
        spawn_hub_sampler(handle, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
