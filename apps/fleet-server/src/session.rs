use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app_state::AppState;
use crate::responses::problem;

pub(crate) const SANDBOX_COOKIE: &str = "fleet_sandbox";

/// Sandbox id carried per request once admission succeeds.
#[derive(Debug, Clone)]
pub(crate) struct SandboxId(pub String);

pub(crate) fn cookie_sandbox(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in raw.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=') {
            if name.trim() == SANDBOX_COOKIE && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

pub(crate) fn session_cookie_value(sandbox_id: &str) -> String {
    format!("{SANDBOX_COOKIE}={sandbox_id}; Path=/; HttpOnly; SameSite=Lax")
}

/// Admission + rate limiting for the `/v1` surface. Every request either
/// refreshes the presented sandbox or allocates a new one; denial short
/// circuits before any handler runs.
pub(crate) async fn sandbox_mw(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = cookie_sandbox(req.headers());
    let session = match state.sandboxes().admit(presented.as_deref()) {
        Ok(view) => view,
        Err(err) => return err.into_response(),
    };
    if !state.rate_limiter().allow(&session.sandbox_id) {
        return problem(
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests",
            "sandbox request rate exceeded",
        );
    }
    let sandbox_id = session.sandbox_id.clone();
    req.extensions_mut().insert(SandboxId(sandbox_id.clone()));
    let mut response = next.run(req).await;
    if session.fresh {
        if let Ok(value) = HeaderValue::from_str(&session_cookie_value(&sandbox_id)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}
