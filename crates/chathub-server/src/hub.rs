//! The hub: admits authenticated connections and serves their requests.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use chathub_core::{Envelope, ErrorCode, UserId};
use chathub_store::Storage;
use metrics::counter;
use tracing::{debug, warn};

use crate::config::{ServerConfig, SessionConfig};
use crate::dispatch::{Dispatched, Dispatcher};
use crate::fanout::fan_out;
use crate::metrics::{REQUEST_ERRORS_TOTAL, WS_REJECTED_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::SessionHandle;
use crate::websocket::session::run_session;

/// Close reason sent when registration is refused after the upgrade.
pub const CAPACITY_EXCEEDED: &str = "CapacityExceeded";

/// Shared state behind every session.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
    session: SessionConfig,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Hub {
    /// Build a hub over `storage`.
    pub fn new(
        config: &ServerConfig,
        storage: Arc<dyn Storage>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(config.max_connections)),
            dispatcher: Dispatcher::new(storage),
            session: config.session(),
            shutdown,
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Whether shutdown has started.
    pub fn is_draining(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    /// Per-session timing and queue parameters.
    pub fn session_config(&self) -> SessionConfig {
        self.session
    }

    /// Register `user` on an upgraded socket and run the session to
    /// completion.
    ///
    /// If the registry refuses the session, the socket is closed with
    /// `1013 CapacityExceeded` and nothing else happens.
    pub async fn accept(self: Arc<Self>, mut socket: WebSocket, user: UserId) {
        let (handle, rx) = SessionHandle::new(
            user,
            self.session.send_queue_capacity,
            self.shutdown.session_token(),
        );

        if let Err(e) = self.registry.register(Arc::clone(&handle)) {
            warn!(user_id = %user, error = %e, "registration refused");
            counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
            let frame = CloseFrame {
                code: close_code::AGAIN,
                reason: Utf8Bytes::from_static(CAPACITY_EXCEEDED),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }

        run_session(socket, handle, rx, self).await;
    }

    /// Serve one decoded request from `session`.
    ///
    /// Exactly one reply goes back to the requester. A committed
    /// send-message is then pushed to the chat's other online members.
    pub async fn handle_request(&self, session: &SessionHandle, env: Envelope) {
        let Some(kind) = env.kind() else {
            warn!(user_id = %env.from, msg_type = env.msg_type, "unknown message type");
            counter!(REQUEST_ERRORS_TOTAL, "msg_type" => "unknown", "code" => ErrorCode::InternalError.as_str())
                .increment(1);
            let _ = session.enqueue(&env.error_reply(ErrorCode::InternalError));
            return;
        };

        let Dispatched { response, fanout } = self.dispatcher.dispatch(kind, env).await;
        let outcome = session.enqueue(&response);
        debug!(msg_type = kind.as_str(), ?outcome, "reply queued");

        if let Some(event) = fanout {
            let _ = fan_out(&self.registry, self.dispatcher.storage(), event).await;
        }
    }
}
