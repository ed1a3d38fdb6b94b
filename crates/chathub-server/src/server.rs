//! `ChatServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chathub_auth::{TokenVerifier, bearer_token};
use chathub_store::Storage;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::{CAPACITY_EXCEEDED, Hub};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session hub.
    pub hub: Arc<Hub>,
    /// Credential check applied before upgrade.
    pub verifier: Arc<dyn TokenVerifier>,
    /// When the server started.
    pub start_time: Instant,
    /// Inbound frame size limit.
    pub max_frame_bytes: usize,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The chat server.
pub struct ChatServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    verifier: Arc<dyn TokenVerifier>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl ChatServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        storage: Arc<dyn Storage>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let hub = Arc::new(Hub::new(&config, storage, Arc::clone(&shutdown)));
        Self {
            config,
            hub,
            verifier,
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            verifier: Arc::clone(&self.verifier),
            start_time: self.start_time,
            max_frame_bytes: self.config.max_frame_bytes,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        info!(%addr, capacity = self.config.max_connections, "chat server listening");
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
            info!("chat server stopped");
        });
        Ok((addr, handle))
    }

    /// The session hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.registry(),
        state.hub.is_draining(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => crate::metrics::render(&handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws: authenticate, check capacity, then upgrade.
///
/// Credentials are checked before the upgrade headers so an unauthenticated
/// client always sees `401`.
async fn ws_handler(
    headers: HeaderMap,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let user = match bearer_token(header_value).and_then(|t| state.verifier.verify(t)) {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "upgrade rejected: authentication failed");
            counter!(WS_REJECTED_TOTAL, "reason" => "unauthorized").increment(1);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    if state.hub.registry().is_full() {
        warn!(user_id = %user, "upgrade rejected: at capacity");
        counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, CAPACITY_EXCEEDED).into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(user_id = %user, error = %rejection, "not a websocket upgrade");
            return rejection.into_response();
        }
    };

    debug!(user_id = %user, "upgrading");
    let hub = Arc::clone(&state.hub);
    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| hub.accept(socket, user))
}
