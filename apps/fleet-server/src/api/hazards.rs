use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Hazard ledger view, one record per blocked segment.
#[utoipa::path(
    get,
    path = "/v1/hazards",
    tag = "Hazards",
    responses(
        (status = 200, description = "Hazard records", body = serde_json::Value),
        (status = 500, description = "Malformed ledger record", body = serde_json::Value)
    )
)]
pub(crate) async fn list_hazards(State(state): State<AppState>) -> Response {
    match state.hazards().list_hazards() {
        Ok(items) => Json(json!({"count": items.len(), "items": items})).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct BlockedIncidentReq {
    pub joykey: String,
    pub segment_id: String,
    pub incident_type: String,
    pub snapshot_ref: String,
}

/// Robot-reported blocked incident. Creates the incident record, blocks the
/// segment's hazard entry, and debits the reporter's reputation.
#[utoipa::path(
    post,
    path = "/v1/incidents/blocked",
    tag = "Hazards",
    request_body = BlockedIncidentReq,
    responses(
        (status = 201, description = "Incident recorded", body = serde_json::Value),
        (status = 400, description = "Invalid joykey or segment id", body = serde_json::Value)
    )
)]
pub(crate) async fn report_blocked_incident(
    State(state): State<AppState>,
    Json(req): Json<BlockedIncidentReq>,
) -> Response {
    let incident = match state.hazards().report_blocked_incident(
        &req.joykey,
        &req.segment_id,
        &req.incident_type,
        &req.snapshot_ref,
    ) {
        Ok(incident) => incident,
        Err(err) => return err.into_response(),
    };
    state
        .reputation()
        .record_event(&req.joykey, -1, "incident_reported");
    (
        StatusCode::CREATED,
        Json(json!({
            "incident_id": incident.incident_id,
            "segment_id": incident.segment_id,
            "created_at": incident.created_at,
        })),
    )
        .into_response()
}
