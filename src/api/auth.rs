//! API-key protection for the `/api` paths.
//!
//! When `API_KEY` is configured, every `/api/...` request must carry it
//! in the `X-API-Key` header or an `api_key` query parameter. Dashboard
//! pages and `/health` stay open: the browser UI calls the API with the
//! key injected server-side.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::Services;

/// Constant-time string equality: the comparison time must not leak
/// how many leading characters matched.
pub fn ct_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = *a.get(i).unwrap_or(&0);
        let y = *b.get(i).unwrap_or(&0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

pub async fn api_key_middleware(
    State(services): State<Arc<Services>>,
    req: Request,
    next: Next,
) -> Response {
    let expected = &services.config.api_key;
    if expected.is_empty() {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if !path.starts_with("/api/") {
        return next.run(req).await;
    }

    let from_header = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let from_query = req.uri().query().and_then(|q| {
        q.split('&')
            .find(|pair| pair.starts_with("api_key="))
            .and_then(|pair| pair.split('=').nth(1))
            .map(|v| v.to_string())
    });

    match from_header.or(from_query) {
        Some(key) if ct_eq(&key, expected) => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid or missing API key"})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_inequality() {
        assert!(ct_eq("secret-key", "secret-key"));
        assert!(!ct_eq("secret-key", "secret-kez"));
        assert!(!ct_eq("secret-key", "secret-ke"));
        assert!(!ct_eq("", "x"));
        assert!(ct_eq("", ""));
    }
}
