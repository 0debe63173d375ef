use axum::http::HeaderMap;
use sha2::Digest;
use tracing::{error, info};

mod ai_jobs;
mod api;
mod app_state;
mod clock;
mod config;
mod error;
mod hazards;
mod policy_ledger;
mod providers;
mod rate_limit;
mod reputation;
mod responses;
mod sandbox;
mod segments;
mod session;
#[cfg(test)]
mod test_support;
mod webhooks;
mod worker;

mod router;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    init_tracing();

    let cfg = config::FleetConfig::from_env();
    let state = AppState::builder().with_config(cfg).build();
    let app = router::build_router(state.clone());

    let tick_ms = std::env::var("FLEET_AI_TICK_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(1_000);
    let poller =
        (tick_ms > 0).then(|| worker::start_ai_tick_poller(state.clone(), tick_ms, 8));

    let addr = std::env::var("FLEET_BIND").unwrap_or_else(|_| "127.0.0.1:8087".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("bind server socket");
    info!(%addr, "fleet coordination store listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }

    if let Some(handle) = poller {
        handle.abort();
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}

fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "debug"
            )
        })
        .unwrap_or(false)
}

/// Admin gate for tick and policy-apply endpoints. Debug mode opens them for
/// local development; otherwise a token must be presented in
/// `Authorization: Bearer` or `X-Fleet-Admin`.
pub(crate) fn admin_ok(headers: &HeaderMap) -> bool {
    if env_truthy("FLEET_DEBUG") {
        return true;
    }

    let token_plain = std::env::var("FLEET_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    let token_hash = std::env::var("FLEET_ADMIN_TOKEN_SHA256")
        .ok()
        .filter(|t| !t.is_empty());
    if token_plain.is_none() && token_hash.is_none() {
        return false;
    }

    let mut presented: Option<String> = None;
    if let Some(hv) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(bearer) = hv.strip_prefix("Bearer ") {
            presented = Some(bearer.to_string());
        }
    }
    if presented.is_none() {
        if let Some(hv) = headers.get("X-Fleet-Admin").and_then(|h| h.to_str().ok()) {
            presented = Some(hv.to_string());
        }
    }
    let Some(ptok) = presented else { return false };

    fn ct_eq(a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        let mut diff: u8 = 0;
        for i in 0..a.len() {
            diff |= a[i] ^ b[i];
        }
        diff == 0
    }

    if let Some(ref hpref) = token_hash {
        let want = hpref.trim().to_ascii_lowercase();
        let got_hex = {
            let mut hasher = sha2::Sha256::new();
            hasher.update(ptok.as_bytes());
            hex::encode(hasher.finalize())
        };
        return ct_eq(want.as_bytes(), got_hex.as_bytes())
            || token_plain
                .as_ref()
                .map(|p| ct_eq(p.as_bytes(), ptok.as_bytes()))
                .unwrap_or(false);
    }
    if let Some(ref p) = token_plain {
        return ct_eq(p.as_bytes(), ptok.as_bytes());
    }
    false
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::{
        config::FleetConfig,
        router::{self, paths},
        test_support::{doubles, env},
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn build_app(env_guard: &mut env::EnvGuard, cfg: FleetConfig) -> Router {
        env_guard.set("FLEET_DEBUG", "1");
        let state = AppState::builder()
            .with_config(cfg)
            .with_renderer(Arc::new(doubles::StaticRenderer))
            .with_provider(Arc::new(doubles::ScriptedProvider::ok("pallet")))
            .build();
        router::build_router(state)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn healthz_is_open() {
        let mut env_guard = env::guard();
        let app = build_app(&mut env_guard, FleetConfig::default());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri(paths::HEALTHZ)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bootstrap_issues_and_reuses_a_session() {
        let mut env_guard = env::guard();
        let app = build_app(&mut env_guard, FleetConfig::default());

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(paths::BOOTSTRAP)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        let cookie = first
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or_default().to_string())
            .expect("session cookie");
        let first_json = body_json(first).await;
        let sandbox_id = first_json["sandbox_id"].as_str().expect("id").to_string();

        let second = app
            .oneshot(
                Request::builder()
                    .uri(paths::BOOTSTRAP)
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let second_json = body_json(second).await;
        assert_eq!(second_json["sandbox_id"].as_str(), Some(sandbox_id.as_str()));
        assert_eq!(second_json["fresh"].as_bool(), Some(false));
    }

    #[tokio::test]
    async fn incident_to_completed_audit_roundtrip() {
        let mut env_guard = env::guard();
        let app = build_app(&mut env_guard, FleetConfig::default());

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::INCIDENTS_BLOCKED,
                json!({
                    "joykey": "acme:bot-1",
                    "segment_id": "cell_4_7",
                    "incident_type": "obstacle",
                    "snapshot_ref": "snap-1.png",
                }),
            ))
            .await
            .expect("incident response");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let incident = body_json(resp).await;
        let incident_id = incident["incident_id"].as_str().expect("id").to_string();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::AI_DISPATCH_EXPLAIN,
                json!({"incident_id": incident_id}),
            ))
            .await
            .expect("dispatch response");
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let job = body_json(resp).await;
        assert_eq!(job["ai_job_status"].as_str(), Some("PENDING"));

        let resp = app
            .clone()
            .oneshot(json_request("POST", paths::ADMIN_AI_TICK, json!({})))
            .await
            .expect("tick response");
        assert_eq!(resp.status(), StatusCode::OK);
        let summary = body_json(resp).await;
        assert_eq!(summary["completed"].as_u64(), Some(1));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(paths::HAZARDS)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("hazards response");
        let hazards = body_json(resp).await;
        assert_eq!(hazards["count"].as_u64(), Some(1));
        assert_eq!(
            hazards["items"][0]["hazard_status"].as_str(),
            Some("SOFT_BLOCKED")
        );
        assert_eq!(
            hazards["items"][0]["obstacle_type"].as_str(),
            Some("pallet")
        );

        // Reputation: -1 for the report, +1 for the confirmed audit.
        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("{}?joykey=acme:bot-1", paths::REPUTATION))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("reputation response");
        let reputation = body_json(resp).await;
        assert_eq!(reputation["score"].as_i64(), Some(0));
    }

    #[tokio::test]
    async fn policy_suggestion_apply_flow() {
        let mut env_guard = env::guard();
        let app = build_app(&mut env_guard, FleetConfig::default());

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::INCIDENTS_BLOCKED,
                json!({
                    "joykey": "acme:bot-2",
                    "segment_id": "cell_9_9",
                    "incident_type": "hard_block",
                    "snapshot_ref": "snap-2.png",
                }),
            ))
            .await
            .expect("incident response");
        let incident_id = body_json(resp).await["incident_id"]
            .as_str()
            .expect("id")
            .to_string();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::AI_POLICY_SUGGEST,
                json!({"incident_id": incident_id}),
            ))
            .await
            .expect("suggest response");
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = app
            .clone()
            .oneshot(json_request("POST", paths::ADMIN_AI_TICK, json!({})))
            .await
            .expect("tick response");
        assert_eq!(body_json(resp).await["completed"].as_u64(), Some(1));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("{}?limit=1", paths::AI_JOBS))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("jobs response");
        let jobs = body_json(resp).await;
        let report_id = jobs["items"][0]["ai_report_id"]
            .as_str()
            .expect("report id")
            .to_string();

        // Missing confirmation is rejected before any ledger write.
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::ADMIN_APPLY_POLICY,
                json!({"ai_report_id": report_id}),
            ))
            .await
            .expect("apply response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::ADMIN_APPLY_POLICY,
                json!({"ai_report_id": report_id, "confirm": true}),
            ))
            .await
            .expect("apply response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["already_applied"].as_bool(), Some(false));

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::ADMIN_APPLY_POLICY,
                json!({"ai_report_id": report_id, "confirm": true}),
            ))
            .await
            .expect("repeat apply response");
        assert_eq!(body_json(resp).await["already_applied"].as_bool(), Some(true));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(paths::POLICY)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("policy response");
        assert_eq!(body_json(resp).await["count"].as_u64(), Some(2));
    }

    #[tokio::test]
    async fn vision_audit_of_a_vision_report_cannot_be_applied() {
        let mut env_guard = env::guard();
        let app = build_app(&mut env_guard, FleetConfig::default());

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::INCIDENTS_BLOCKED,
                json!({
                    "joykey": "acme:bot-3",
                    "segment_id": "cell_1_1",
                    "incident_type": "obstacle",
                    "snapshot_ref": "snap-3.png",
                }),
            ))
            .await
            .expect("incident response");
        let incident_id = body_json(resp).await["incident_id"]
            .as_str()
            .expect("id")
            .to_string();
        app.clone()
            .oneshot(json_request(
                "POST",
                paths::AI_DISPATCH_EXPLAIN,
                json!({"incident_id": incident_id}),
            ))
            .await
            .expect("dispatch response");
        app.clone()
            .oneshot(json_request("POST", paths::ADMIN_AI_TICK, json!({})))
            .await
            .expect("tick response");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("{}?limit=1", paths::AI_JOBS))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("jobs response");
        let report_id = body_json(resp).await["items"][0]["ai_report_id"]
            .as_str()
            .expect("report id")
            .to_string();

        let resp = app
            .oneshot(json_request(
                "POST",
                paths::ADMIN_APPLY_POLICY,
                json!({"ai_report_id": report_id, "confirm": true}),
            ))
            .await
            .expect("apply response");
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn webhook_targets_are_screened() {
        let mut env_guard = env::guard();
        let app = build_app(&mut env_guard, FleetConfig::default());

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                paths::WEBHOOK_SUBSCRIPTIONS,
                json!({"target_url": "http://127.0.0.1:22/x"}),
            ))
            .await
            .expect("loopback response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(json_request(
                "POST",
                paths::WEBHOOK_SUBSCRIPTIONS,
                json!({"target_url": "https://hooks.example.com/fleet", "event_types": ["hazards.updated"]}),
            ))
            .await
            .expect("public response");
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = body_json(resp).await;
        assert!(body["subscription"]["id"].as_str().is_some());
        assert!(body["subscription"].get("secret").is_none());
    }

    #[tokio::test]
    async fn rate_limit_applies_per_sandbox() {
        let mut env_guard = env::guard();
        let cfg = FleetConfig {
            rate_max_requests: 2,
            ..FleetConfig::default()
        };
        let app = build_app(&mut env_guard, cfg);

        let bootstrap = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(paths::BOOTSTRAP)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("bootstrap response");
        let cookie = bootstrap
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or_default().to_string())
            .expect("session cookie");

        for expected in [StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS] {
            let resp = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(paths::HAZARDS)
                        .header(header::COOKIE, &cookie)
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("hazards response");
            assert_eq!(resp.status(), expected);
        }
    }

    #[tokio::test]
    async fn admin_gate_requires_a_token_without_debug() {
        let mut env_guard = env::guard();
        env_guard.set("FLEET_DEBUG", "0");
        env_guard.set("FLEET_ADMIN_TOKEN", "secret-token");
        env_guard.remove("FLEET_ADMIN_TOKEN_SHA256");
        let state = AppState::builder()
            .with_renderer(Arc::new(doubles::StaticRenderer))
            .with_provider(Arc::new(doubles::ScriptedProvider::ok("pallet")))
            .build();
        let app = router::build_router(state);

        let resp = app
            .clone()
            .oneshot(json_request("POST", paths::ADMIN_AI_TICK, json!({})))
            .await
            .expect("unauthenticated response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut req = json_request("POST", paths::ADMIN_AI_TICK, json!({}));
        req.headers_mut().insert(
            "X-Fleet-Admin",
            axum::http::HeaderValue::from_static("secret-token"),
        );
        let resp = app.oneshot(req).await.expect("authenticated response");
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
