use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::ai_jobs::AiJobType;
use crate::app_state::AppState;
use crate::error::StoreError;

#[derive(Deserialize, ToSchema)]
pub(crate) struct AiJobReq {
    pub incident_id: String,
}

/// Requests a vision audit of a reported incident. Deduplicated: a repeat
/// request inside the dedup window returns the existing job.
#[utoipa::path(
    post,
    path = "/v1/ai/dispatch_explain",
    tag = "AI",
    request_body = AiJobReq,
    responses(
        (status = 202, description = "Job accepted or reused", body = serde_json::Value),
        (status = 404, description = "Unknown incident", body = serde_json::Value)
    )
)]
pub(crate) async fn dispatch_explain(
    State(state): State<AppState>,
    Json(req): Json<AiJobReq>,
) -> Response {
    create(state, &req.incident_id, AiJobType::VisionAudit)
}

/// Requests a policy suggestion for a reported incident.
#[utoipa::path(
    post,
    path = "/v1/ai/policy_suggest",
    tag = "AI",
    request_body = AiJobReq,
    responses(
        (status = 202, description = "Job accepted or reused", body = serde_json::Value),
        (status = 404, description = "Unknown incident", body = serde_json::Value)
    )
)]
pub(crate) async fn policy_suggest(
    State(state): State<AppState>,
    Json(req): Json<AiJobReq>,
) -> Response {
    create(state, &req.incident_id, AiJobType::PolicySuggest)
}

fn create(state: AppState, incident_id: &str, job_type: AiJobType) -> Response {
    match state.ai_jobs().create_job(incident_id, job_type) {
        Ok(view) => (StatusCode::ACCEPTED, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct JobListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Newest-first job views.
#[utoipa::path(
    get,
    path = "/v1/ai/jobs",
    tag = "AI",
    params(("limit" = Option<usize>, Query, description = "Max entries (default 50, max 500)")),
    responses((status = 200, description = "Jobs", body = serde_json::Value))
)]
pub(crate) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(500);
    let items = state.ai_jobs().list_jobs(limit);
    Json(json!({"count": items.len(), "items": items}))
}

/// Job lookup by its report id; only terminal jobs carry one.
#[utoipa::path(
    get,
    path = "/v1/ai/jobs/{ai_report_id}",
    tag = "AI",
    params(("ai_report_id" = String, Path, description = "Report id issued at completion")),
    responses(
        (status = 200, description = "Job view", body = serde_json::Value),
        (status = 404, description = "Unknown report id", body = serde_json::Value)
    )
)]
pub(crate) async fn job_by_report_id(
    State(state): State<AppState>,
    Path(ai_report_id): Path<String>,
) -> Response {
    match state.ai_jobs().get_job_by_report_id(&ai_report_id) {
        Some(view) => Json(view).into_response(),
        None => StoreError::NotFound("ai_report").into_response(),
    }
}
