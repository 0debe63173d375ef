use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::session;

pub(crate) mod paths {
    pub(crate) const HEALTHZ: &str = "/healthz";
    pub(crate) const BOOTSTRAP: &str = "/bootstrap";
    pub(crate) const HAZARDS: &str = "/v1/hazards";
    pub(crate) const INCIDENTS_BLOCKED: &str = "/v1/incidents/blocked";
    pub(crate) const SEGMENTS_PASSED: &str = "/v1/segments/passed";
    pub(crate) const TRACKS: &str = "/v1/tracks";
    pub(crate) const REPUTATION: &str = "/v1/reputation";
    pub(crate) const SCORE_EVENTS: &str = "/v1/score_events";
    pub(crate) const VENDOR_SCORES: &str = "/v1/vendor_scores";
    pub(crate) const POLICY: &str = "/v1/policy";
    pub(crate) const AI_DISPATCH_EXPLAIN: &str = "/v1/ai/dispatch_explain";
    pub(crate) const AI_POLICY_SUGGEST: &str = "/v1/ai/policy_suggest";
    pub(crate) const AI_JOBS: &str = "/v1/ai/jobs";
    pub(crate) const AI_JOB_BY_REPORT: &str = "/v1/ai/jobs/{ai_report_id}";
    pub(crate) const ADMIN_APPLY_POLICY: &str = "/v1/admin/apply_policy_suggestion";
    pub(crate) const ADMIN_AI_TICK: &str = "/v1/admin/ai_tick";
    pub(crate) const WEBHOOK_SUBSCRIPTIONS: &str = "/v1/webhooks/subscriptions";
}

/// Full HTTP surface. Everything under `/v1` sits behind sandbox admission
/// and per-sandbox rate limiting; `/healthz` and `/bootstrap` do not.
pub(crate) fn build_router(state: AppState) -> Router {
    let sandboxed = Router::new()
        .route(
            paths::HAZARDS,
            get(api::hazards::list_hazards),
        )
        .route(
            paths::INCIDENTS_BLOCKED,
            post(api::hazards::report_blocked_incident),
        )
        .route(
            paths::SEGMENTS_PASSED,
            post(api::segments::record_segment_passed)
                .get(api::segments::list_segment_passed_signals),
        )
        .route(paths::TRACKS, get(api::segments::robot_track))
        .route(paths::REPUTATION, get(api::reputation::reputation))
        .route(paths::SCORE_EVENTS, get(api::reputation::score_events))
        .route(paths::VENDOR_SCORES, get(api::reputation::vendor_scores))
        .route(paths::POLICY, get(api::policy::state_policy))
        .route(paths::AI_DISPATCH_EXPLAIN, post(api::ai::dispatch_explain))
        .route(paths::AI_POLICY_SUGGEST, post(api::ai::policy_suggest))
        .route(paths::AI_JOBS, get(api::ai::list_jobs))
        .route(paths::AI_JOB_BY_REPORT, get(api::ai::job_by_report_id))
        .route(
            paths::ADMIN_APPLY_POLICY,
            post(api::admin::apply_policy_suggestion),
        )
        .route(paths::ADMIN_AI_TICK, post(api::admin::ai_tick))
        .route(paths::WEBHOOK_SUBSCRIPTIONS, post(api::webhooks::subscribe))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::sandbox_mw,
        ));

    Router::new()
        .route(paths::HEALTHZ, get(api::meta::healthz))
        .route(paths::BOOTSTRAP, get(api::meta::bootstrap))
        .merge(sandboxed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
