//! # chathub-auth
//!
//! Turns the bearer credential presented at connection time into an
//! authenticated [`UserId`](chathub_core::UserId).
//!
//! The server depends only on the [`TokenVerifier`] trait; [`JwtVerifier`] is
//! the production implementation for tokens minted by the auth service.

#![deny(unsafe_code)]

pub mod bearer;
pub mod errors;
pub mod jwt;

pub use bearer::bearer_token;
pub use errors::AuthError;
pub use jwt::{Claims, JwtVerifier};

use chathub_core::UserId;

/// Verifies a bearer credential.
pub trait TokenVerifier: Send + Sync {
    /// Return the user the token was issued to.
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}
