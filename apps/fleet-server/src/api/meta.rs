use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::app_state::AppState;
use crate::session;

/// Liveness probe; never touches any store.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    responses((status = 200, description = "Service is live", body = serde_json::Value))
)]
pub(crate) async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Establishes or refreshes the caller's sandbox session and returns its
/// identity. The session cookie is (re)issued on every call.
#[utoipa::path(
    get,
    path = "/bootstrap",
    tag = "Meta",
    responses(
        (status = 200, description = "Sandbox session", body = serde_json::Value),
        (status = 503, description = "Sandbox capacity exhausted", body = serde_json::Value)
    )
)]
pub(crate) async fn bootstrap(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let presented = session::cookie_sandbox(&headers);
    match state.sandboxes().admit(presented.as_deref()) {
        Ok(view) => {
            let mut response = Json(&view).into_response();
            if let Ok(value) =
                HeaderValue::from_str(&session::session_cookie_value(&view.sandbox_id))
            {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            response
        }
        Err(err) => err.into_response(),
    }
}
