//! WebSocket session handles and the per-connection session actor.

pub mod connection;
pub mod session;

pub use connection::{CloseReason, EnqueueOutcome, SessionHandle, SessionState};
