//! Server configuration.

use std::time::Duration;

use chathub_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the chat server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum registered sessions.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_frame_bytes: usize,
    /// Per-session outbound queue bound.
    pub send_queue_capacity: usize,
    /// Keepalive ping interval in seconds.
    pub ping_interval_secs: u64,
    /// Read deadline in seconds.
    pub read_timeout_secs: u64,
    /// Per-frame write deadline in seconds.
    pub write_timeout_secs: u64,
}

impl ServerConfig {
    /// Timing and queue parameters handed to every session actor.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            send_queue_capacity: self.send_queue_capacity,
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 52,
            max_frame_bytes: 64 * 1024,
            send_queue_capacity: 256,
            ping_interval_secs: 54,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            max_frame_bytes: s.max_frame_bytes,
            send_queue_capacity: s.send_queue_capacity,
            ping_interval_secs: s.ping_interval_secs,
            read_timeout_secs: s.read_timeout_secs,
            write_timeout_secs: s.write_timeout_secs,
        }
    }
}

/// Per-session parameters.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Outbound queue bound.
    pub send_queue_capacity: usize,
    /// Keepalive ping interval; shorter than `read_timeout`.
    pub ping_interval: Duration,
    /// Close the session if nothing arrives for this long.
    pub read_timeout: Duration,
    /// Close the session if one frame takes longer than this to write.
    pub write_timeout: Duration,
}
