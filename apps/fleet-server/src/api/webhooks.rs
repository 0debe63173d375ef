use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::responses::problem;
use crate::webhooks::reason_code;

#[derive(Deserialize, ToSchema)]
pub(crate) struct SubscribeReq {
    pub target_url: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Registers an outbound webhook target. The URL is screened against literal
/// loopback/private addresses and non-standard ports before it is stored.
#[utoipa::path(
    post,
    path = "/v1/webhooks/subscriptions",
    tag = "Webhooks",
    request_body = SubscribeReq,
    responses(
        (status = 201, description = "Subscription stored", body = serde_json::Value),
        (status = 400, description = "Target URL rejected", body = serde_json::Value)
    )
)]
pub(crate) async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeReq>,
) -> Response {
    match state.webhooks().subscribe(
        &req.target_url,
        req.event_types,
        req.secret,
        req.is_enabled,
    ) {
        Ok(view) => {
            (StatusCode::CREATED, Json(json!({"subscription": view}))).into_response()
        }
        Err(reason) => problem(
            StatusCode::BAD_REQUEST,
            "Target URL Rejected",
            &format!("target url rejected: {}", reason_code(reason)),
        ),
    }
}
