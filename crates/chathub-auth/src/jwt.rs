//! JWT verification for tokens minted by the auth service.
//!
//! The auth service signs with RS256, sets `iss` to its own name and `sub` to
//! the decimal user id, and expires tokens after twelve hours. HS256 with a
//! shared secret is accepted as an alternative key source for development.

use std::path::Path;

use chathub_core::UserId;
use chathub_settings::AuthSettings;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::TokenVerifier;
use crate::errors::AuthError;

/// Claims carried by an access token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Decimal user id.
    pub sub: String,
    /// Issuer name.
    pub iss: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// Verifies signed JWTs and extracts the subject as a [`UserId`].
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// RS256 verifier from a PEM-encoded public key.
    pub fn rs256(public_key_pem: &[u8], issuer: &str) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| AuthError::Config(format!("invalid RSA public key: {e}")))?;
        Ok(Self::with_key(key, Algorithm::RS256, issuer))
    }

    /// HS256 verifier from a shared secret.
    pub fn hs256(secret: &[u8], issuer: &str) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256, issuer)
    }

    /// Build from settings, preferring the RSA public key when configured.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        if let Some(ref path) = settings.public_key_path {
            let pem = read_key(Path::new(path))?;
            info!(path = %path, issuer = %settings.issuer, "RS256 token verification enabled");
            return Self::rs256(&pem, &settings.issuer);
        }
        if let Some(ref secret) = settings.hmac_secret {
            info!(issuer = %settings.issuer, "HS256 token verification enabled");
            return Ok(Self::hs256(secret.as_bytes(), &settings.issuer));
        }
        Err(AuthError::Config(
            "neither auth.publicKeyPath nor auth.hmacSecret is set".into(),
        ))
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm, issuer: &str) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;
        Self { key, validation }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        let sub = data.claims.sub;
        let user = sub
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(UserId::new)
            .ok_or(AuthError::InvalidSubject(sub))?;
        debug!(user_id = %user, "token verified");
        Ok(user)
    }
}

fn read_key(path: &Path) -> Result<Vec<u8>, AuthError> {
    std::fs::read(path)
        .map_err(|e| AuthError::Config(format!("cannot read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &[u8] = b"test-secret";
    const ISSUER: &str = "auth_service";
    const PRIVATE_PEM: &[u8] = include_bytes!("../tests/fixtures/issuer_private.pem");
    const PUBLIC_PEM: &[u8] = include_bytes!("../tests/fixtures/issuer_public.pem");

    fn claims(sub: &str, iss: &str, ttl_secs: i64) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: sub.into(),
            iss: iss.into(),
            exp: (now + ttl_secs) as u64,
            iat: Some(now as u64),
        }
    }

    fn hs_token(c: &Claims) -> String {
        encode(&Header::new(Algorithm::HS256), c, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn rs_token(c: &Claims) -> String {
        let key = EncodingKey::from_rsa_pem(PRIVATE_PEM).unwrap();
        encode(&Header::new(Algorithm::RS256), c, &key).unwrap()
    }

    #[test]
    fn hs256_valid_token() {
        let verifier = JwtVerifier::hs256(SECRET, ISSUER);
        let token = hs_token(&claims("42", ISSUER, 3600));
        assert_eq!(verifier.verify(&token).unwrap(), UserId::new(42));
    }

    #[test]
    fn rs256_valid_token() {
        let verifier = JwtVerifier::rs256(PUBLIC_PEM, ISSUER).unwrap();
        let token = rs_token(&claims("7", ISSUER, 12 * 3600));
        assert_eq!(verifier.verify(&token).unwrap(), UserId::new(7));
    }

    #[test]
    fn expired_token_rejected() {
        let verifier = JwtVerifier::hs256(SECRET, ISSUER);
        let token = hs_token(&claims("42", ISSUER, -120));
        assert_matches!(verifier.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_issuer_rejected() {
        let verifier = JwtVerifier::hs256(SECRET, ISSUER);
        let token = hs_token(&claims("42", "someone_else", 3600));
        assert_matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn wrong_secret_rejected() {
        let verifier = JwtVerifier::hs256(b"other-secret", ISSUER);
        let token = hs_token(&claims("42", ISSUER, 3600));
        assert_matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn algorithm_mismatch_rejected() {
        let verifier = JwtVerifier::rs256(PUBLIC_PEM, ISSUER).unwrap();
        let token = hs_token(&claims("42", ISSUER, 3600));
        assert_matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn non_numeric_or_zero_subject_rejected() {
        let verifier = JwtVerifier::hs256(SECRET, ISSUER);
        let token = hs_token(&claims("alice", ISSUER, 3600));
        assert_matches!(verifier.verify(&token), Err(AuthError::InvalidSubject(s)) if s == "alice");
        let token = hs_token(&claims("0", ISSUER, 3600));
        assert_matches!(verifier.verify(&token), Err(AuthError::InvalidSubject(_)));
    }

    #[test]
    fn garbage_token_rejected() {
        let verifier = JwtVerifier::hs256(SECRET, ISSUER);
        assert_matches!(verifier.verify("not.a.jwt"), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn debug_shows_algorithm_not_key() {
        let verifier = JwtVerifier::hs256(SECRET, ISSUER);
        let shown = format!("{verifier:?}");
        assert!(shown.contains("HS256"));
        assert!(shown.contains(ISSUER));
        assert!(!shown.contains(std::str::from_utf8(SECRET).unwrap()));
    }

    #[test]
    fn from_settings_requires_a_key_source() {
        let settings = AuthSettings::default();
        assert_matches!(JwtVerifier::from_settings(&settings), Err(AuthError::Config(_)));
    }

    #[test]
    fn from_settings_uses_secret() {
        let settings = AuthSettings {
            hmac_secret: Some("test-secret".into()),
            ..AuthSettings::default()
        };
        let verifier = JwtVerifier::from_settings(&settings).unwrap();
        let token = hs_token(&claims("5", ISSUER, 60));
        assert_eq!(verifier.verify(&token).unwrap(), UserId::new(5));
    }

    #[test]
    fn from_settings_missing_key_file() {
        let settings = AuthSettings {
            public_key_path: Some("/nonexistent/key.pem".into()),
            ..AuthSettings::default()
        };
        assert_matches!(JwtVerifier::from_settings(&settings), Err(AuthError::Config(msg)) if msg.contains("cannot read"));
    }
}
