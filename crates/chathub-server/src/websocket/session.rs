//! Session actor: drives one registered connection from activation through
//! teardown.
//!
//! The inbound loop reads and decodes frames and hands envelopes to the hub.
//! A spawned outbound task drains the session queue to the socket and sends
//! keepalive pings. Either side ends the session by closing the handle, which
//! cancels the other.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use chathub_core::Envelope;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{Instrument, debug, info, instrument, warn};

use super::connection::{CloseReason, SessionHandle, SessionState};
use crate::config::SessionConfig;
use crate::hub::Hub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_PROTOCOL_ERRORS_TOTAL,
};

/// Run a registered session until it closes.
#[instrument(skip_all, fields(user_id = %handle.user_id(), conn_id = %handle.conn_id()))]
pub async fn run_session(
    socket: WebSocket,
    handle: Arc<SessionHandle>,
    rx: mpsc::Receiver<Arc<str>>,
    hub: Arc<Hub>,
) {
    let config = hub.session_config();
    handle.advance(SessionState::Active);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!("session active");

    let (ws_tx, mut ws_rx) = socket.split();
    let outbound = tokio::spawn(
        run_outbound(ws_tx, rx, Arc::clone(&handle), config).in_current_span(),
    );

    let user_id = handle.user_id();
    let cancel = handle.cancel_token().clone();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = time::timeout(config.read_timeout, ws_rx.next()) => next,
        };

        let msg = match next {
            Err(_elapsed) => {
                warn!(timeout = ?config.read_timeout, "no frame within read deadline");
                let _ = handle.close(CloseReason::LivenessTimeout);
                break;
            }
            Ok(None) => {
                let _ = handle.close(CloseReason::PeerClosed);
                break;
            }
            Ok(Some(Err(e))) => {
                debug!(error = %e, "read failed");
                let _ = handle.close(CloseReason::Transport);
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let decoded = match msg {
            Message::Text(text) => Envelope::decode(text.as_str(), user_id),
            Message::Binary(bytes) => Envelope::decode_bytes(&bytes, user_id),
            // Any frame refreshes the deadline.
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(frame) => {
                debug!(?frame, "peer sent close frame");
                let _ = handle.close(CloseReason::PeerClosed);
                break;
            }
        };

        match decoded {
            Ok(envelope) => hub.handle_request(&handle, envelope).await,
            Err(e) => {
                warn!(error = %e, "undecodable frame, closing session");
                counter!(WS_PROTOCOL_ERRORS_TOTAL).increment(1);
                let _ = handle.close(CloseReason::ProtocolViolation);
                break;
            }
        }
    }

    // Cancelled from above without a recorded reason.
    let _ = handle.close(CloseReason::Shutdown);
    if let Err(e) = outbound.await {
        warn!(error = %e, "outbound task failed");
    }

    let released = hub.registry().release(&handle);
    handle.advance(SessionState::Closed);
    let reason = handle.close_reason().unwrap_or(CloseReason::Shutdown);
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(handle.age().as_secs_f64());
    info!(reason = reason.as_str(), released, "session closed");
}

/// Drain the session queue to the socket, interleaving keepalive pings.
async fn run_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    handle: Arc<SessionHandle>,
    config: SessionConfig,
) {
    let cancel = handle.cancel_token().clone();
    let mut ping = time::interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    let _ = handle.close(CloseReason::Transport);
                    break;
                };
                let msg = Message::Text(frame.to_string().into());
                if !write(&mut sink, msg, config.write_timeout).await {
                    let _ = handle.close(CloseReason::Transport);
                    break;
                }
            }
            _ = ping.tick() => {
                if !write(&mut sink, Message::Ping(Vec::new().into()), config.write_timeout).await {
                    let _ = handle.close(CloseReason::Transport);
                    break;
                }
            }
        }
    }

    if let Some((code, reason)) = handle.close_reason().and_then(CloseReason::close_frame) {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        };
        let _ = write(&mut sink, Message::Close(Some(frame)), config.write_timeout).await;
    }
    let _ = time::timeout(config.write_timeout, sink.close()).await;
}

/// Send one frame, bounded by `deadline`. Returns `false` on error or timeout.
async fn write(sink: &mut SplitSink<WebSocket, Message>, msg: Message, deadline: Duration) -> bool {
    match time::timeout(deadline, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "write failed");
            false
        }
        Err(_elapsed) => {
            warn!(timeout = ?deadline, "write timed out");
            false
        }
    }
}
