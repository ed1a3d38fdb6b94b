//! Process-wide shutdown signal via `CancellationToken`.
//!
//! Every session's token is a child of the coordinator's token, so a single
//! [`ShutdownCoordinator::shutdown`] reaches every live session.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;
use crate::websocket::CloseReason;

/// Owns the root token the HTTP server and all sessions hang off.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh root token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// The root token. The HTTP listener stops accepting when it fires.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token for one session: cancelled by shutdown, or independently.
    pub fn session_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancel the root token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the root token has fired.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the hub: close every registered session as [`CloseReason::Shutdown`],
    /// cancel the root token, then wait up to `timeout` for `server` to exit.
    ///
    /// Returns `false` if the server task was still running at the deadline.
    pub async fn drain(
        &self,
        registry: &ConnectionRegistry,
        server: JoinHandle<()>,
        timeout: Duration,
    ) -> bool {
        let sessions = registry.close_all(CloseReason::Shutdown);
        self.shutdown();
        info!(sessions, timeout = ?timeout, "draining");

        match tokio::time::timeout(timeout, server).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "server task failed during drain");
                true
            }
            Err(_elapsed) => {
                warn!(remaining = registry.len(), "drain deadline passed");
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::SessionHandle;
    use chathub_core::UserId;

    #[test]
    fn session_tokens_follow_the_root() {
        let coord = ShutdownCoordinator::new();
        let a = coord.session_token();
        let b = coord.session_token();
        assert!(!coord.is_shutting_down());

        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(a.is_cancelled() && b.is_cancelled());
    }

    #[test]
    fn one_session_can_stop_alone() {
        let coord = ShutdownCoordinator::new();
        let a = coord.session_token();
        let b = coord.session_token();
        a.cancel();
        assert!(!b.is_cancelled());
        assert!(!coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_closes_sessions_and_waits_for_server() {
        let coord = ShutdownCoordinator::new();
        let registry = ConnectionRegistry::new(4);
        let (handle, _rx) = SessionHandle::new(UserId::new(1), 4, coord.session_token());
        registry.register(std::sync::Arc::clone(&handle)).unwrap();

        let root = coord.token();
        let server = tokio::spawn(async move { root.cancelled().await });

        assert!(coord.drain(&registry, server, Duration::from_secs(5)).await);
        assert_eq!(handle.close_reason(), Some(CloseReason::Shutdown));
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_at_deadline() {
        let coord = ShutdownCoordinator::new();
        let registry = ConnectionRegistry::new(4);
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        assert!(!coord.drain(&registry, stuck, Duration::from_millis(100)).await);
    }
}
