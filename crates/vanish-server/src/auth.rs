use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;
use serde_json::json;
use tracing::debug;

use crate::AppState;

/// Credential carried in `Authorization: Bearer <token>`. The scheme name is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Compare a presented token with the configured one without leaking timing.
/// Nothing matches when no token is configured.
fn admits(presented: Option<&str>, configured: Option<&str>) -> bool {
    let (Some(presented), Some(configured)) = (presented, configured) else {
        return false;
    };
    constant_time_eq(presented.as_bytes(), configured.as_bytes())
}

/// Middleware for admin routes.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !admits(bearer_token(request.headers()), state.admin_token.as_deref()) {
        debug!(path = %request.uri().path(), "rejected admin request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response();
    }
    next.run(request).await
}
