use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::error::StoreError;

#[derive(Deserialize, ToSchema)]
pub(crate) struct SegmentPassedReq {
    pub segment_id: String,
    pub joykey: String,
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Segment-pass telemetry ingest. A malformed segment id is discarded, not
/// rejected: the response reports `retained: false` and nothing is stored.
#[utoipa::path(
    post,
    path = "/v1/segments/passed",
    tag = "Segments",
    request_body = SegmentPassedReq,
    responses(
        (status = 200, description = "Ingest result", body = serde_json::Value),
        (status = 400, description = "Missing joykey", body = serde_json::Value)
    )
)]
pub(crate) async fn record_segment_passed(
    State(state): State<AppState>,
    Json(req): Json<SegmentPassedReq>,
) -> impl IntoResponse {
    if req.joykey.trim().is_empty() {
        return StoreError::validation("joykey", "must not be empty").into_response();
    }
    let ts = req.ts.unwrap_or_else(|| {
        state.clock().now().timestamp_millis() as f64 / 1_000.0
    });
    let retained = state.segments().record_segment_passed(
        &req.segment_id,
        ts,
        &req.joykey,
        req.source.as_deref().unwrap_or("telemetry"),
    );
    Json(json!({"segment_id": req.segment_id, "retained": retained})).into_response()
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct SegmentListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Most-recent-first segment freshness signals.
#[utoipa::path(
    get,
    path = "/v1/segments/passed",
    tag = "Segments",
    params(("limit" = Option<usize>, Query, description = "Max entries (default 100)")),
    responses((status = 200, description = "Pass signals", body = serde_json::Value))
)]
pub(crate) async fn list_segment_passed_signals(
    State(state): State<AppState>,
    Query(query): Query<SegmentListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100).min(crate::segments::SEGMENT_CACHE_CAP);
    let items = state.segments().list_segment_passed_signals(limit);
    Json(json!({"count": items.len(), "items": items}))
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct TrackQuery {
    pub joykey: String,
}

/// Oldest-first recent track for one robot.
#[utoipa::path(
    get,
    path = "/v1/tracks",
    tag = "Segments",
    params(("joykey" = String, Query, description = "Robot identity key")),
    responses((status = 200, description = "Recent track", body = serde_json::Value))
)]
pub(crate) async fn robot_track(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> impl IntoResponse {
    let track = state.segments().track_for(&query.joykey);
    Json(json!({"joykey": query.joykey, "track": track}))
}
