use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::app_state::AppState;

#[derive(Deserialize, ToSchema)]
pub(crate) struct ReputationQuery {
    pub joykey: String,
}

/// Aggregate score for one robot.
#[utoipa::path(
    get,
    path = "/v1/reputation",
    tag = "Reputation",
    params(("joykey" = String, Query, description = "Robot identity key")),
    responses(
        (status = 200, description = "Reputation aggregate", body = serde_json::Value),
        (status = 404, description = "No events for this joykey", body = serde_json::Value)
    )
)]
pub(crate) async fn reputation(
    State(state): State<AppState>,
    Query(query): Query<ReputationQuery>,
) -> Response {
    match state.reputation().reputation_for(&query.joykey) {
        Ok(view) => Json(view).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct ScoreEventsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Newest-first slice of the score event ledger.
#[utoipa::path(
    get,
    path = "/v1/score_events",
    tag = "Reputation",
    params(("limit" = Option<usize>, Query, description = "Max entries (default 100, max 1000)")),
    responses((status = 200, description = "Score events", body = serde_json::Value))
)]
pub(crate) async fn score_events(
    State(state): State<AppState>,
    Query(query): Query<ScoreEventsQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100).min(1_000);
    let items = state.reputation().list_events(limit);
    Json(json!({"count": items.len(), "items": items}))
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct VendorScoresQuery {
    #[serde(default)]
    pub fleet_id: Option<String>,
}

/// Per-vendor aggregates, optionally filtered to one fleet.
#[utoipa::path(
    get,
    path = "/v1/vendor_scores",
    tag = "Reputation",
    params(("fleet_id" = Option<String>, Query, description = "Restrict to one fleet")),
    responses((status = 200, description = "Vendor aggregates", body = serde_json::Value))
)]
pub(crate) async fn vendor_scores(
    State(state): State<AppState>,
    Query(query): Query<VendorScoresQuery>,
) -> impl IntoResponse {
    let items = state.reputation().vendor_scores(query.fleet_id.as_deref());
    Json(json!({"count": items.len(), "items": items}))
}
