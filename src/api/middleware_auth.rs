//! Access-token extraction.
//!
//! Tokens are verified by the role lookup, not here: this layer only finds
//! the token. Request bodies may carry `accessToken`; otherwise the
//! `Authorization: Bearer <token>` header is used.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};

/// The bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string()).filter(|t| !t.is_empty())
}

/// Body token first, then the header.
pub fn pick_token(body_token: Option<&str>, header: Option<String>) -> Option<String> {
    body_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or(header)
}

/// Optional bearer token extractor; never rejects.
pub struct BearerToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(BearerToken(bearer_token(&parts.headers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc".into()));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc".into()));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn body_token_wins_over_header() {
        assert_eq!(pick_token(Some("body"), Some("hdr".into())), Some("body".into()));
        assert_eq!(pick_token(Some("  "), Some("hdr".into())), Some("hdr".into()));
        assert_eq!(pick_token(None, None), None);
    }
}
