//! # chathub-telemetry
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] seeded from
//! settings (overridden by `RUST_LOG`) and a stdout formatter in either JSON
//! or human-readable form.

#![deny(unsafe_code)]

use chathub_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Fallback directive when the configured level does not parse.
const FALLBACK_DIRECTIVE: &str = "info";

/// Build the filter: `RUST_LOG` if set and valid, else `level`, else `info`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
}

/// Initialize logging. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed (as happens
/// when several tests boot a server in one process).
pub fn init_telemetry(settings: &LoggingSettings) -> bool {
    let filter = build_filter(&settings.level);

    let (json_layer, pretty_layer) = match settings.format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(tracing_subscriber::fmt::layer().pretty().with_target(true)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .is_ok()
}
