//! # chathub-core
//!
//! Types shared by every chathub crate:
//!
//! - **Identifiers**: numeric [`UserId`], [`ChatId`], [`MessageId`] and the
//!   per-connection [`ConnectionId`]
//! - **Protocol**: the [`Envelope`] exchanged over a session, the closed
//!   [`MsgType`] taxonomy, and the opaque [`ErrorCode`]s sent back on failure
//! - **Models**: [`Chat`] and [`Message`] rows as handlers return them

#![deny(unsafe_code)]

pub mod ids;
pub mod models;
pub mod protocol;

pub use ids::{ChatId, ConnectionId, MessageId, UserId};
pub use models::{Chat, Message};
pub use protocol::{Envelope, ErrorCode, MsgType, ProtocolError, SERVER_ID, SUCCESS};
