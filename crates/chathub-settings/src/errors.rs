//! Settings error types.

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("reading settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON, or does not fit the schema.
    #[error("parsing settings: {0}")]
    Json(#[from] serde_json::Error),
    /// A merged value breaks a constraint.
    #[error("{key}: {reason}")]
    Invalid {
        /// Dotted camelCase path of the offending key.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
