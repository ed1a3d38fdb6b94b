//! # chathub-server
//!
//! Real-time session hub for the chat backend.
//!
//! - [`registry`]: who is online, with admission control
//! - [`websocket`]: one actor per connection (inbound decode loop, outbound
//!   drain loop, keepalive)
//! - [`dispatch`]: routes decoded envelopes to the request handlers
//! - [`fanout`]: pushes new messages to the other online chat members
//! - [`server`]: Axum router, authenticated upgrade, graceful shutdown

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod fanout;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use hub::Hub;
pub use registry::{ConnectionRegistry, HubError};
pub use server::ChatServer;
pub use shutdown::ShutdownCoordinator;
