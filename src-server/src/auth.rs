use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::routes::error_response;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejects requests without an accepted `X-API-Key` header.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let verdict = match request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        None => Err(("MISSING_API_KEY", "The X-API-Key header is required")),
        Some(key) if !state.accepts_key(key) => {
            Err(("INVALID_API_KEY", "The supplied API key is not valid"))
        }
        Some(_) => Ok(()),
    };

    match verdict {
        Ok(()) => next.run(request).await,
        Err((code, message)) => {
            warn!(path = %request.uri().path(), code, "Rejected unauthenticated request");
            error_response(StatusCode::UNAUTHORIZED, code, message)
        }
    }
}
