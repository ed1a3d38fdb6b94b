//! Prometheus metrics recorder and `/metrics` endpoint support.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Fails if a
/// recorder is already installed.
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

/// WebSocket sessions opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions closed total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket session duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connection attempts refused (counter, labels: reason).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Frames that could not be decoded (counter).
pub const WS_PROTOCOL_ERRORS_TOTAL: &str = "ws_protocol_errors_total";
/// Sessions closed because their outbound queue filled (counter).
pub const WS_SLOW_CONSUMER_TOTAL: &str = "ws_slow_consumer_total";
/// Requests dispatched (counter, labels: `msg_type`).
pub const REQUESTS_TOTAL: &str = "requests_total";
/// Failed requests (counter, labels: `msg_type`, code).
pub const REQUEST_ERRORS_TOTAL: &str = "request_errors_total";
/// Request handling duration seconds (histogram, labels: `msg_type`).
pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";
/// Notifications queued to online chat members (counter).
pub const FANOUT_DELIVERED_TOTAL: &str = "fanout_delivered_total";
/// Chat members skipped because they were offline or closing (counter).
pub const FANOUT_SKIPPED_TOTAL: &str = "fanout_skipped_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_REJECTED_TOTAL,
            WS_PROTOCOL_ERRORS_TOTAL,
            WS_SLOW_CONSUMER_TOTAL,
            REQUESTS_TOTAL,
            REQUEST_ERRORS_TOTAL,
            REQUEST_DURATION_SECONDS,
            FANOUT_DELIVERED_TOTAL,
            FANOUT_SKIPPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
