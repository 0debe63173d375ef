use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::app_state::AppState;

/// Policy decision ledger snapshot, oldest entry first.
#[utoipa::path(
    get,
    path = "/v1/policy",
    tag = "Policy",
    responses((status = 200, description = "Decision ledger", body = serde_json::Value))
)]
pub(crate) async fn state_policy(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.policy_ledger().snapshot())
}
