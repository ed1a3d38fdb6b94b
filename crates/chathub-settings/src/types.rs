//! Settings types.
//!
//! All sections deserialize with `#[serde(default)]`, so a settings file only
//! needs the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Network and session tuning.
    pub server: ServerSettings,
    /// Bearer token verification.
    pub auth: AuthSettings,
    /// Chat storage.
    pub database: DatabaseSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl HubSettings {
    /// Check cross-field constraints the individual types cannot express.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.max_connections == 0 {
            return Err(invalid("server.maxConnections", "must be at least 1"));
        }
        if s.send_queue_capacity == 0 {
            return Err(invalid("server.sendQueueCapacity", "must be at least 1"));
        }
        if s.max_frame_bytes < MIN_FRAME_BYTES {
            return Err(invalid(
                "server.maxFrameBytes",
                format!("must be at least {MIN_FRAME_BYTES}"),
            ));
        }
        if s.ping_interval_secs == 0 || s.ping_interval_secs >= s.read_timeout_secs {
            return Err(invalid(
                "server.pingIntervalSecs",
                format!(
                    "{} must be non-zero and below server.readTimeoutSecs ({})",
                    s.ping_interval_secs, s.read_timeout_secs
                ),
            ));
        }
        if s.write_timeout_secs == 0 {
            return Err(invalid("server.writeTimeoutSecs", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Smallest frame limit that still fits a minimal envelope.
pub const MIN_FRAME_BYTES: usize = 64;

/// Server network and session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (0 for auto-assign).
    pub port: u16,
    /// Maximum number of registered sessions.
    pub max_connections: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_bytes: usize,
    /// Outbound frames buffered per session before it counts as a slow consumer.
    pub send_queue_capacity: usize,
    /// Interval between server keepalive pings.
    pub ping_interval_secs: u64,
    /// Read deadline; refreshed by every inbound frame.
    pub read_timeout_secs: u64,
    /// Deadline for a single outbound frame write.
    pub write_timeout_secs: u64,
    /// How long shutdown waits for the server task to drain.
    pub shutdown_timeout_secs: u64,
}

impl ServerSettings {
    /// Keepalive ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Read deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Per-frame write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Shutdown drain budget.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 52525,
            max_connections: 52,
            max_frame_bytes: 64 * 1024,
            send_queue_capacity: 256,
            ping_interval_secs: 54,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Bearer token verification settings.
///
/// Exactly one key source is used: the RSA public key when
/// `public_key_path` is set, otherwise the shared HMAC secret.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Required `iss` claim.
    pub issuer: String,
    /// PEM file holding the issuer's RS256 public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<String>,
    /// Shared HS256 secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac_secret: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            issuer: "auth_service".to_string(),
            public_key_path: None,
            hmac_secret: None,
        }
    }
}

/// Chat storage settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// `SQLite` file. Defaults to `~/.chathub/chathub.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DatabaseSettings {
    /// The configured path, or the default under the user's home directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map_or_else(|| chathub_dir().join("chathub.db"), PathBuf::from)
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, multi-line.
    Pretty,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// `~/.chathub`, falling back to `/tmp/.chathub` without a home directory.
pub fn chathub_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chathub")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        HubSettings::default().validate().unwrap();
    }

    #[test]
    fn default_server_values() {
        let s = ServerSettings::default();
        assert_eq!(s.max_connections, 52);
        assert_eq!(s.ping_interval(), Duration::from_secs(54));
        assert_eq!(s.read_timeout(), Duration::from_secs(60));
        assert_eq!(s.write_timeout(), Duration::from_secs(10));
        assert!(s.ping_interval() < s.read_timeout());
    }

    #[test]
    fn default_auth_issuer() {
        let a = AuthSettings::default();
        assert_eq!(a.issuer, "auth_service");
        assert!(a.public_key_path.is_none());
        assert!(a.hmac_secret.is_none());
    }

    #[test]
    fn ping_must_be_shorter_than_read_timeout() {
        let mut settings = HubSettings::default();
        settings.server.ping_interval_secs = 60;
        settings.server.read_timeout_secs = 60;
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { key: "server.pingIntervalSecs", .. }));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut settings = HubSettings::default();
        settings.server.max_connections = 0;
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { key: "server.maxConnections", .. }));

        let mut settings = HubSettings::default();
        settings.server.send_queue_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { key: "server.sendQueueCapacity", .. }));
    }

    #[test]
    fn tiny_frame_limit_rejected() {
        let mut settings = HubSettings::default();
        settings.server.max_frame_bytes = 10;
        assert_matches!(settings.validate(), Err(SettingsError::Invalid { key: "server.maxFrameBytes", .. }));
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(HubSettings::default()).unwrap();
        assert_eq!(v["server"]["maxConnections"], 52);
        assert_eq!(v["server"]["pingIntervalSecs"], 54);
        assert_eq!(v["logging"]["format"], "json");
        assert!(v["auth"].get("hmacSecret").is_none());
    }

    #[test]
    fn explicit_database_path_wins() {
        let db = DatabaseSettings {
            path: Some("/var/lib/chathub/chat.db".into()),
        };
        assert_eq!(db.resolved_path(), PathBuf::from("/var/lib/chathub/chat.db"));
    }

    #[test]
    fn default_database_path_under_chathub_dir() {
        let path = DatabaseSettings::default().resolved_path();
        assert!(path.ends_with(".chathub/chathub.db"), "got: {}", path.display());
    }
}
