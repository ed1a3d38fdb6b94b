//! Authentication error types.

use thiserror::Error;

/// Why a connection attempt was not authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header.
    #[error("missing bearer credential")]
    Missing,
    /// `Authorization` header present but not `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,
    /// Token is past its `exp`.
    #[error("token expired")]
    Expired,
    /// Signature, issuer or structure check failed.
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    /// `sub` is not a positive integer user id.
    #[error("invalid subject claim: {0:?}")]
    InvalidSubject(String),
    /// Verifier could not be built from settings.
    #[error("auth configuration: {0}")]
    Config(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::InvalidToken(e),
        }
    }
}
