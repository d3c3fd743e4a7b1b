//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Envelopes accepted by the bus (counter, labels: kind).
pub const BUS_PUBLISH_TOTAL: &str = "bus_publish_total";
/// Envelopes the bus rejected or that could not be encoded (counter).
pub const BUS_PUBLISH_ERRORS_TOTAL: &str = "bus_publish_errors_total";
/// Messages received by the listener (counter).
pub const BUS_MESSAGES_RECEIVED_TOTAL: &str = "bus_messages_received_total";
/// Received messages dropped as malformed (counter).
pub const BUS_MALFORMED_TOTAL: &str = "bus_malformed_total";
/// Listener respawns after a crash (counter).
pub const BUS_LISTENER_RESTARTS_TOTAL: &str = "bus_listener_restarts_total";
/// Local sends that failed during fan-out (counter).
pub const FANOUT_SEND_FAILURES_TOTAL: &str = "fanout_send_failures_total";
