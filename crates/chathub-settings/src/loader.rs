//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HubSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `CHATHUB_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{HubSettings, LogFormat, chathub_dir};

/// Resolve the path to the settings file (`~/.chathub/settings.json`).
pub fn settings_path() -> PathBuf {
    chathub_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, starts from defaults. Invalid JSON or a
/// merged result that fails validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HubSettings> {
    let defaults = serde_json::to_value(HubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HubSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut HubSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Integers must parse and fall within range; invalid values are ignored
/// with a warning and the file/default value stays.
pub fn apply_overrides<F>(settings: &mut HubSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CHATHUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("CHATHUB_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.number("CHATHUB_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.number("CHATHUB_MAX_FRAME_BYTES", 64, 64 * 1024 * 1024) {
        settings.server.max_frame_bytes = v;
    }
    if let Some(v) = env.number("CHATHUB_SEND_QUEUE", 1, 1_000_000) {
        settings.server.send_queue_capacity = v;
    }
    if let Some(v) = env.number("CHATHUB_PING_INTERVAL", 1, 3600) {
        settings.server.ping_interval_secs = v;
    }
    if let Some(v) = env.number("CHATHUB_READ_TIMEOUT", 2, 7200) {
        settings.server.read_timeout_secs = v;
    }
    if let Some(v) = env.number("CHATHUB_WRITE_TIMEOUT", 1, 3600) {
        settings.server.write_timeout_secs = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CHATHUB_AUTH_ISSUER") {
        settings.auth.issuer = v;
    }
    if let Some(v) = env.string("CHATHUB_AUTH_PUBLIC_KEY_PATH") {
        settings.auth.public_key_path = Some(v);
    }
    if let Some(v) = env.string("CHATHUB_AUTH_HMAC_SECRET") {
        settings.auth.hmac_secret = Some(v);
    }

    // ── Database / logging ──────────────────────────────────────────
    if let Some(v) = env.string("CHATHUB_DB_PATH") {
        settings.database.path = Some(v);
    }
    if let Some(v) = env.string("CHATHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CHATHUB_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "CHATHUB_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

/// Parse `val` as a number within `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim()
        .parse()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" | "text" => Some(LogFormat::Pretty),
        _ => None,
    }
}

/// Reads `CHATHUB_*` variables through an injectable lookup.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    /// A bounded number; out-of-range or unparsable values are ignored.
    fn number<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: FromStr + PartialOrd + Display + Copy,
    {
        let raw = (self.lookup)(name)?;
        let parsed = parse_in_range(&raw, min, max);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %raw, %min, %max, "ignoring out-of-range override");
        }
        parsed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
