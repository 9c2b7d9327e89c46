//! server::auth
//!
//! Shared-secret gate for the mutation routes.
//!
//! Callers present the secret in `X-Api-Key` or as `Authorization: Bearer`.
//! Both sides are hashed with SHA-256 and the digests compared without an
//! early exit, so neither the secret's length nor its prefix leaks through
//! response timing.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::payloads::unauthorized;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The configured secret, held only as its digest.
#[derive(Clone)]
pub struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Whether `presented` matches the configured secret.
    pub fn verify(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        constant_time_eq(&self.digest, &presented)
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Pull the presented secret from the request headers.
///
/// `X-Api-Key` wins when both headers are present.
pub fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
}

/// The credential of a `Bearer` authorization value. The scheme name is
/// case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware rejecting requests without the shared secret.
pub async fn require_secret(
    State(secret): State<Arc<SharedSecret>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    match presented_secret(&headers) {
        Some(key) if secret.verify(key) => next.run(request).await,
        Some(_) => {
            warn!(path = request.uri().path(), "invalid secret presented");
            unauthorized().into_response()
        }
        None => {
            debug!(path = request.uri().path(), "no secret presented");
            unauthorized().into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn verify_matches_only_exact_secret() {
        let secret = SharedSecret::new("s3cret");
        assert!(secret.verify("s3cret"));
        assert!(!secret.verify("s3cre"));
        assert!(!secret.verify("s3cret "));
        assert!(!secret.verify(""));
    }

    #[test]
    fn api_key_header_is_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("from-key"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(presented_secret(&headers), Some("from-key"));
    }

    #[test]
    fn bearer_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(presented_secret(&headers), Some("tok"));
    }

    #[test]
    fn bearer_scheme_ignores_case() {
        for value in ["bearer tok", "BEARER tok", "BeArEr  tok "] {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
            assert_eq!(presented_secret(&headers), Some("tok"), "{value:?}");
        }
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(presented_secret(&headers), None);
        assert_eq!(presented_secret(&HeaderMap::new()), None);
    }

    #[test]
    fn debug_redacts() {
        assert!(!format!("{:?}", SharedSecret::new("hunter2")).contains("hunter2"));
    }
}
