//! Per-session handle shared between the session actor, the registry and
//! fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::close_code;
use chathub_core::{ConnectionId, Envelope, UserId};
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::metrics::WS_SLOW_CONSUMER_TOTAL;

/// Session lifecycle. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Authenticated and upgraded, not yet admitted.
    Connecting = 0,
    /// Admitted by the registry.
    Registered = 1,
    /// Inbound and outbound tasks running.
    Active = 2,
    /// Teardown requested.
    Closing = 3,
    /// Transport closed, registry entry removed.
    Closed = 4,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Registered,
            2 => Self::Active,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or hung up.
    PeerClosed,
    /// Read or write failed on the transport, including oversize frames.
    Transport,
    /// A frame did not decode into an envelope.
    ProtocolViolation,
    /// Nothing arrived within the read deadline.
    LivenessTimeout,
    /// The outbound queue filled up.
    SlowConsumer,
    /// A newer session registered for the same user.
    Replaced,
    /// Removed from the registry explicitly.
    Unregistered,
    /// Process shutdown.
    Shutdown,
}

impl CloseReason {
    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::Transport => "transport",
            Self::ProtocolViolation => "protocol_violation",
            Self::LivenessTimeout => "liveness_timeout",
            Self::SlowConsumer => "slow_consumer",
            Self::Replaced => "replaced",
            Self::Unregistered => "unregistered",
            Self::Shutdown => "shutdown",
        }
    }

    /// Close frame to send, if the transport is still worth writing to.
    pub fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            Self::PeerClosed | Self::Transport => None,
            Self::ProtocolViolation => Some((close_code::INVALID, "ProtocolDecodeError")),
            Self::LivenessTimeout => Some((close_code::AWAY, "LivenessTimeout")),
            Self::SlowConsumer => Some((close_code::POLICY, "SlowConsumer")),
            Self::Replaced => Some((close_code::NORMAL, "Replaced")),
            Self::Unregistered => Some((close_code::NORMAL, "Unregistered")),
            Self::Shutdown => Some((close_code::AWAY, "Shutdown")),
        }
    }
}

/// Result of [`SessionHandle::enqueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Frame is on the outbound queue.
    Queued,
    /// Session is closing or closed; frame discarded silently.
    Closed,
    /// Queue was full; the session has been closed as a slow consumer.
    SlowConsumer,
    /// Envelope could not be serialized; session unaffected.
    Dropped,
}

/// Handle to one live session.
///
/// Cheap to share; the registry and fan-out hold `Arc<SessionHandle>` and
/// never block on it.
pub struct SessionHandle {
    user_id: UserId,
    conn_id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
    state: AtomicU8,
    close_reason: Mutex<Option<CloseReason>>,
    connected_at: Instant,
}

impl SessionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(
        user_id: UserId,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = Arc::new(Self {
            user_id,
            conn_id: ConnectionId::new(),
            tx,
            cancel,
            state: AtomicU8::new(SessionState::Connecting as u8),
            close_reason: Mutex::new(None),
            connected_at: Instant::now(),
        });
        (handle, rx)
    }

    /// The authenticated user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Unique id of this transport connection.
    pub fn conn_id(&self) -> &ConnectionId {
        &self.conn_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` unless already past it.
    pub fn advance(&self, next: SessionState) {
        let _ = self.state.fetch_max(next as u8, Ordering::AcqRel);
    }

    /// Cancelled when the session must stop, for any reason.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether teardown has begun.
    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled() || self.state() >= SessionState::Closing
    }

    /// Request teardown. The first reason recorded wins.
    ///
    /// Returns `true` if this call initiated the close.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
                true
            } else {
                false
            }
        };
        self.advance(SessionState::Closing);
        self.cancel.cancel();
        if first {
            debug!(user_id = %self.user_id, conn_id = %self.conn_id, reason = reason.as_str(), "session close requested");
        }
        first
    }

    /// Why the session is closing. Shutdown if cancelled from above.
    pub fn close_reason(&self) -> Option<CloseReason> {
        let recorded = *self.close_reason.lock();
        recorded.or_else(|| self.cancel.is_cancelled().then_some(CloseReason::Shutdown))
    }

    /// Serialize `envelope` and queue it for the outbound task.
    pub fn enqueue(&self, envelope: &Envelope) -> EnqueueOutcome {
        if self.is_closing() {
            return EnqueueOutcome::Closed;
        }
        match envelope.to_frame() {
            Ok(frame) => self.enqueue_frame(Arc::from(frame)),
            Err(e) => {
                error!(user_id = %self.user_id, error = %e, "failed to serialize envelope");
                EnqueueOutcome::Dropped
            }
        }
    }

    /// Queue an already serialized frame. Never blocks.
    ///
    /// A full queue closes the session as a slow consumer.
    pub fn enqueue_frame(&self, frame: Arc<str>) -> EnqueueOutcome {
        if self.is_closing() {
            return EnqueueOutcome::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                warn!(
                    user_id = %self.user_id,
                    conn_id = %self.conn_id,
                    capacity = self.tx.max_capacity(),
                    "outbound queue full, closing slow consumer"
                );
                counter!(WS_SLOW_CONSUMER_TOTAL).increment(1);
                let _ = self.close(CloseReason::SlowConsumer);
                EnqueueOutcome::SlowConsumer
            }
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("user_id", &self.user_id)
            .field("conn_id", &self.conn_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chathub_core::MsgType;
    use serde_json::json;

    fn make_handle(capacity: usize) -> (Arc<SessionHandle>, mpsc::Receiver<Arc<str>>) {
        SessionHandle::new(UserId::new(42), capacity, CancellationToken::new())
    }

    fn envelope() -> Envelope {
        Envelope::new(MsgType::ListUserChats, UserId::new(0), 42, json!([]))
    }

    #[test]
    fn new_handle_is_connecting() {
        let (handle, _rx) = make_handle(4);
        assert_eq!(handle.user_id(), UserId::new(42));
        assert_eq!(handle.state(), SessionState::Connecting);
        assert!(!handle.is_closing());
        assert!(handle.close_reason().is_none());
    }

    #[tokio::test]
    async fn enqueue_serializes_once_per_frame() {
        let (handle, mut rx) = make_handle(4);
        assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::Queued);
        let frame = rx.recv().await.unwrap();
        let wire: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(wire["msgType"], 11);
        assert_eq!(wire["to"], 42);
    }

    #[tokio::test]
    async fn outbound_order_is_fifo() {
        let (handle, mut rx) = make_handle(8);
        for i in 0..5 {
            assert_eq!(handle.enqueue_frame(Arc::from(i.to_string())), EnqueueOutcome::Queued);
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), i.to_string());
        }
    }

    #[test]
    fn full_queue_closes_as_slow_consumer() {
        let (handle, _rx) = make_handle(2);
        assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::Queued);
        assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::Queued);
        assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::SlowConsumer);
        assert!(handle.is_closing());
        assert!(handle.cancel_token().is_cancelled());
        assert_eq!(handle.close_reason(), Some(CloseReason::SlowConsumer));
        // Further enqueues are silent no-ops.
        assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::Closed);
    }

    #[test]
    fn enqueue_after_close_is_silent_noop() {
        let (handle, _rx) = make_handle(2);
        assert!(handle.close(CloseReason::PeerClosed));
        handle.advance(SessionState::Closed);
        for _ in 0..10 {
            assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::Closed);
        }
    }

    #[test]
    fn enqueue_with_dropped_receiver_reports_closed() {
        let (handle, rx) = make_handle(2);
        drop(rx);
        assert_eq!(handle.enqueue(&envelope()), EnqueueOutcome::Closed);
        assert!(!handle.is_closing());
    }

    #[test]
    fn first_close_reason_wins() {
        let (handle, _rx) = make_handle(2);
        assert!(handle.close(CloseReason::LivenessTimeout));
        assert!(!handle.close(CloseReason::Transport));
        assert_eq!(handle.close_reason(), Some(CloseReason::LivenessTimeout));
    }

    #[test]
    fn parent_cancellation_reads_as_shutdown() {
        let parent = CancellationToken::new();
        let (handle, _rx) = SessionHandle::new(UserId::new(1), 2, parent.child_token());
        parent.cancel();
        assert!(handle.is_closing());
        assert_eq!(handle.close_reason(), Some(CloseReason::Shutdown));
    }

    #[test]
    fn state_never_moves_backwards() {
        let (handle, _rx) = make_handle(2);
        handle.advance(SessionState::Active);
        handle.advance(SessionState::Registered);
        assert_eq!(handle.state(), SessionState::Active);
        handle.advance(SessionState::Closed);
        handle.advance(SessionState::Closing);
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[test]
    fn close_frames() {
        assert_eq!(CloseReason::PeerClosed.close_frame(), None);
        assert_eq!(CloseReason::Transport.close_frame(), None);
        assert_eq!(CloseReason::SlowConsumer.close_frame(), Some((1008, "SlowConsumer")));
        assert_eq!(CloseReason::Shutdown.close_frame(), Some((1001, "Shutdown")));
        assert_eq!(
            CloseReason::ProtocolViolation.close_frame(),
            Some((1007, "ProtocolDecodeError"))
        );
    }

    #[test]
    fn connection_ids_differ_per_handle() {
        let (a, _ra) = make_handle(1);
        let (b, _rb) = make_handle(1);
        assert_eq!(a.user_id(), b.user_id());
        assert_ne!(a.conn_id(), b.conn_id());
    }
}
