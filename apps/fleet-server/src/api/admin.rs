use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::ai_jobs::{AiJobStatus, AiJobType};
use crate::app_state::AppState;
use crate::error::StoreError;
use crate::responses::unauthorized;

#[derive(Deserialize, ToSchema)]
pub(crate) struct ApplyPolicyReq {
    pub ai_report_id: String,
    #[serde(default)]
    pub confirm: bool,
}

/// Operator confirmation of an AI policy suggestion. Ledger bookkeeping only;
/// the preconditions gate what can be applied, and a repeat apply is reported
/// rather than re-recorded.
#[utoipa::path(
    post,
    path = "/v1/admin/apply_policy_suggestion",
    tag = "Admin",
    request_body = ApplyPolicyReq,
    responses(
        (status = 200, description = "Applied (or already applied)", body = serde_json::Value),
        (status = 400, description = "Missing confirmation", body = serde_json::Value),
        (status = 401, description = "Unauthorized", body = serde_json::Value),
        (status = 404, description = "Unknown report id", body = serde_json::Value),
        (status = 409, description = "Job not an applicable suggestion", body = serde_json::Value)
    )
)]
pub(crate) async fn apply_policy_suggestion(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ApplyPolicyReq>,
) -> Response {
    if !crate::admin_ok(&headers) {
        return unauthorized();
    }
    if !req.confirm {
        return StoreError::validation("confirm", "explicit confirmation required")
            .into_response();
    }
    let Some(job) = state.ai_jobs().get_job_by_report_id(&req.ai_report_id) else {
        return StoreError::NotFound("ai_report").into_response();
    };
    if job.ai_job_type != AiJobType::PolicySuggest {
        return StoreError::Conflict("job is not a policy suggestion".into()).into_response();
    }
    if job.ai_job_status != AiJobStatus::Completed {
        return StoreError::Conflict("suggestion job has not completed".into()).into_response();
    }
    if !state.policy_ledger().has_policy_suggested(&req.ai_report_id) {
        return StoreError::Conflict("no recorded suggestion for this report".into())
            .into_response();
    }
    let result = state
        .policy_ledger()
        .apply_policy_suggestion_ledger_only(&req.ai_report_id);
    Json(result).into_response()
}

#[derive(Deserialize, ToSchema)]
pub(crate) struct AiTickReq {
    #[serde(default)]
    pub max_jobs: Option<usize>,
}

/// Manually pulls the AI job engine. Primary driver in tests and small
/// deployments; production uses the background poller.
#[utoipa::path(
    post,
    path = "/v1/admin/ai_tick",
    tag = "Admin",
    request_body = AiTickReq,
    responses(
        (status = 200, description = "Tick summary", body = serde_json::Value),
        (status = 401, description = "Unauthorized", body = serde_json::Value)
    )
)]
pub(crate) async fn ai_tick(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AiTickReq>,
) -> Response {
    if !crate::admin_ok(&headers) {
        return unauthorized();
    }
    let max_jobs = req.max_jobs.unwrap_or(8).clamp(1, 64);
    let summary = state.ai_jobs().tick(max_jobs).await;
    Json(summary).into_response()
}
