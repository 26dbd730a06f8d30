//! API-key authentication for the client-facing endpoints.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::AppState;

/// Middleware: validates `X-API-Key` against the configured key.
/// On success, stashes the derived requester ref in request extensions
/// for handlers to pick up.
pub async fn api_key_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingApiKey)?;

    if !keys_match(provided, &state.config.api_key) {
        // SECURITY: never log the expected key or the full provided key
        tracing::warn!(key = %mask(provided), "rejected request with invalid API key");
        return Err(AppError::InvalidApiKey);
    }

    let requester = requester_ref(provided);
    req.extensions_mut().insert(RequesterRef(requester));
    Ok(next.run(req).await)
}

/// Middleware: validates the decision key on the inbound decision
/// callback. Falls back to the API key when no dedicated key is set.
pub async fn decision_key_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::MissingApiKey)?;

    if !keys_match(provided, state.config.decision_key()) {
        tracing::warn!(key = %mask(provided), "rejected decision callback with invalid key");
        return Err(AppError::InvalidApiKey);
    }
    Ok(next.run(req).await)
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Opaque caller identity derived from the presented API key.
/// Audit only — never used for authorization.
#[derive(Debug, Clone)]
pub struct RequesterRef(pub String);

pub fn requester_ref(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)[..12].to_string()
}

fn mask(key: &str) -> String {
    if key.len() > 8 {
        format!("{}…{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requester_ref_is_stable_and_short() {
        let a = requester_ref("secret-key");
        let b = requester_ref("secret-key");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, requester_ref("other-key"));
    }

    #[test]
    fn test_requester_ref_does_not_echo_key() {
        assert!(!requester_ref("secret-key").contains("secret"));
    }

    #[test]
    fn test_mask_hides_middle() {
        assert_eq!(mask("abcdefghijkl"), "abcd…ijkl");
        assert_eq!(mask("short"), "****");
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("k1", "k1"));
        assert!(!keys_match("k1", "k2"));
        assert!(!keys_match("k1", "k1 "));
    }
}
