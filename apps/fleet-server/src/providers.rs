use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STD;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::ai_jobs::{AuditOutcome, AuditProvider, AuditReport, AiJobType, SnapshotRenderer};
use crate::hazards::IncidentRecord;

/// Resolves snapshot refs against a root directory. Refs are opaque relative
/// paths; anything absolute or escaping the root is rejected.
pub(crate) struct FsSnapshotRenderer {
    root: PathBuf,
}

impl FsSnapshotRenderer {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, snapshot_ref: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(snapshot_ref);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            anyhow::bail!("snapshot ref {snapshot_ref:?} escapes the snapshot root");
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl SnapshotRenderer for FsSnapshotRenderer {
    async fn render(&self, snapshot_ref: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(snapshot_ref)?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(bytes)
    }
}

/// Remote audit endpoint speaking JSON over HTTP. Transport faults and
/// malformed response bodies both come back as classified failures.
pub(crate) struct HttpAuditProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditProvider {
    pub(crate) fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn report_from(body: &Value) -> Option<AuditReport> {
        let summary = body.get("summary")?.as_str()?.to_string();
        Some(AuditReport {
            summary,
            confidence: body.get("confidence").and_then(Value::as_f64),
            obstacle_type: body
                .get("obstacle_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            sample_index: body.get("sample_index").and_then(Value::as_u64),
        })
    }
}

#[async_trait]
impl AuditProvider for HttpAuditProvider {
    async fn audit(
        &self,
        job_type: AiJobType,
        incident: &IncidentRecord,
        image: &[u8],
    ) -> AuditOutcome {
        let payload = json!({
            "job_type": job_type.as_str(),
            "incident": incident,
            "image_b64": BASE64_STD.encode(image),
        });
        let response = match self.client.post(&self.endpoint).json(&payload).send().await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(error = %err, "audit provider request failed");
                return AuditOutcome::Failed(AuditReport::failure(format!(
                    "provider request failed: {err}"
                )));
            }
        };
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) => {
                return AuditOutcome::Failed(AuditReport::failure("invalid JSON from provider"))
            }
        };
        match Self::report_from(&body) {
            Some(report) => AuditOutcome::Completed(report),
            None => AuditOutcome::Failed(AuditReport::failure("invalid JSON from provider")),
        }
    }
}

/// Deterministic local fallback used when no provider endpoint is configured.
/// Keeps the engine exercisable without network access.
pub(crate) struct HeuristicAuditProvider;

#[async_trait]
impl AuditProvider for HeuristicAuditProvider {
    async fn audit(
        &self,
        job_type: AiJobType,
        incident: &IncidentRecord,
        _image: &[u8],
    ) -> AuditOutcome {
        let obstacle = incident
            .incident_type
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_ascii_lowercase();
        AuditOutcome::Completed(AuditReport {
            summary: format!(
                "{} heuristic for segment {}: {obstacle}",
                job_type.as_str(),
                incident.segment_id
            ),
            confidence: Some(0.5),
            obstacle_type: Some(obstacle),
            sample_index: Some(0),
        })
    }
}
