//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

use crate::registry::ConnectionRegistry;

/// Coarse server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting connections.
    Ok,
    /// Shutdown started; sessions are being closed.
    Draining,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Whether the hub is serving or draining.
    pub status: HealthStatus,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered sessions.
    pub connections: usize,
    /// Registry limit.
    pub capacity: usize,
}

/// Snapshot the registry.
pub fn health_check(
    start_time: Instant,
    registry: &ConnectionRegistry,
    draining: bool,
) -> HealthResponse {
    HealthResponse {
        status: if draining {
            HealthStatus::Draining
        } else {
            HealthStatus::Ok
        },
        uptime_secs: start_time.elapsed().as_secs(),
        connections: registry.len(),
        capacity: registry.capacity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::SessionHandle;
    use chathub_core::UserId;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn counts_registered_sessions() {
        let registry = ConnectionRegistry::new(52);
        let (h, _rx) = SessionHandle::new(UserId::new(3), 4, CancellationToken::new());
        registry.register(Arc::clone(&h)).unwrap();

        let resp = health_check(Instant::now(), &registry, false);
        assert_eq!(resp.status, HealthStatus::Ok);
        assert_eq!(resp.connections, 1);
        assert_eq!(resp.capacity, 52);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(90)).unwrap();
        let resp = health_check(start, &ConnectionRegistry::new(1), false);
        assert!(resp.uptime_secs >= 89);
    }

    #[test]
    fn wire_shape() {
        let resp = health_check(Instant::now(), &ConnectionRegistry::new(8), true);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "draining");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["capacity"], 8);
        assert!(json["uptimeSecs"].is_number());
    }
}
