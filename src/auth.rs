//! A single shared `X-API-Key` check. The spec treats this as an equality
//! test against a configured secret, not a multi-user identity system, so
//! this module is intentionally small.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::router::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejects any request whose `X-API-Key` header is missing or doesn't
/// match the configured key. Callers mount this only on the non-`/health`
/// routes.
pub async fn require_api_key(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == state.api_key => Ok(next.run(request).await),
        _ => Err(StatusCode::FORBIDDEN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_name_is_lowercase_canonical_form() {
        assert_eq!(API_KEY_HEADER, "x-api-key");
    }
}
