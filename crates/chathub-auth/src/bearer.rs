//! `Authorization` header parsing.

use crate::errors::AuthError;

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; surrounding whitespace is
/// ignored.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::Missing)?.trim();
    let (scheme, token) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader);
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn extracts_token() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(Some("bearer   tok ")).unwrap(), "tok");
    }

    #[test]
    fn missing_header() {
        assert_matches!(bearer_token(None), Err(AuthError::Missing));
    }

    #[test]
    fn wrong_scheme_or_empty_token() {
        assert_matches!(bearer_token(Some("Basic dXNlcg==")), Err(AuthError::MalformedHeader));
        assert_matches!(bearer_token(Some("Bearer")), Err(AuthError::MalformedHeader));
        assert_matches!(bearer_token(Some("Bearer    ")), Err(AuthError::MalformedHeader));
        assert_matches!(bearer_token(Some("")), Err(AuthError::MalformedHeader));
    }
}
