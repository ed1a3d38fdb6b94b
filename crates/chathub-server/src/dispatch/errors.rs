//! Handler error type and its mapping to opaque wire codes.

use chathub_core::ErrorCode;
use chathub_store::StoreError;

/// Why a request handler failed.
///
/// The detail text is for logs only; the wire sees [`HandlerError::code`].
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Missing or malformed target or payload.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requester is not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The addressed chat or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The storage layer failed.
    #[error(transparent)]
    Storage(StoreError),

    /// A result could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HandlerError {
    /// Opaque code sent to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Storage(_) | Self::Serialization(_) => ErrorCode::InternalError,
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Conflict(msg) => Self::InvalidRequest(msg),
            other => Self::Storage(other),
        }
    }
}
