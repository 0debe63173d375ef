use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use crate::clock::Clock;
use crate::config::FleetConfig;
use crate::error::StoreError;
use crate::hazards::{HazardLedger, IncidentRecord};
use crate::policy_ledger::PolicyDecisionLedger;
use crate::reputation::ReputationLedger;
use fleet_topics as topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum AiJobType {
    VisionAudit,
    PolicySuggest,
}

impl AiJobType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AiJobType::VisionAudit => "VISION_AUDIT",
            AiJobType::PolicySuggest => "POLICY_SUGGEST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum AiJobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuditReport {
    pub summary: String,
    pub confidence: Option<f64>,
    pub obstacle_type: Option<String>,
    pub sample_index: Option<u64>,
}

impl AuditReport {
    /// Classified failure shape: detail in the summary, no confidence.
    pub(crate) fn failure(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            confidence: None,
            obstacle_type: None,
            sample_index: None,
        }
    }
}

/// Outcome of one provider invocation. Failures arrive pre-classified; the
/// engine never sees an unhandled provider fault.
#[derive(Debug, Clone)]
pub(crate) enum AuditOutcome {
    Completed(AuditReport),
    Failed(AuditReport),
}

/// Renders a snapshot reference into image bytes.
#[async_trait]
pub(crate) trait SnapshotRenderer: Send + Sync {
    async fn render(&self, snapshot_ref: &str) -> anyhow::Result<Vec<u8>>;
}

/// Runs the vision/policy audit against a rendered snapshot.
#[async_trait]
pub(crate) trait AuditProvider: Send + Sync {
    async fn audit(
        &self,
        job_type: AiJobType,
        incident: &IncidentRecord,
        image: &[u8],
    ) -> AuditOutcome;
}

#[derive(Debug, Clone)]
struct AiJob {
    ai_job_id: String,
    ai_job_type: AiJobType,
    incident_id: String,
    status: AiJobStatus,
    lease_token: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    ai_report_id: Option<String>,
    result: Option<AuditReport>,
}

impl AiJob {
    fn view(&self) -> JobView {
        JobView {
            ai_job_id: self.ai_job_id.clone(),
            ai_job_type: self.ai_job_type,
            incident_id: self.incident_id.clone(),
            ai_job_status: self.status,
            created_at: self.created_at.to_rfc3339(),
            lease_expires_at: self.lease_expires_at.map(|t| t.to_rfc3339()),
            ai_report_id: self.ai_report_id.clone(),
            result: self.result.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobView {
    pub ai_job_id: String,
    pub ai_job_type: AiJobType,
    pub incident_id: String,
    pub ai_job_status: AiJobStatus,
    pub created_at: String,
    pub lease_expires_at: Option<String>,
    pub ai_report_id: Option<String>,
    pub result: Option<AuditReport>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct TickSummary {
    pub leased: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped_budget: usize,
}

struct LeaseGrant {
    job_id: String,
    token: String,
    job_type: AiJobType,
    incident_id: String,
}

#[derive(Default)]
struct EngineState {
    jobs: HashMap<String, AiJob>,
    by_dedup: HashMap<String, String>,
    by_report: HashMap<String, String>,
    /// Creation order, for deterministic lease scans.
    order: Vec<String>,
    daily_calls: u32,
    budget_bucket: u64,
}

/// AI job lease/dedup/budget engine. The lock is held only across in-memory
/// transitions; external work (render + provider) runs unlocked between the
/// lease acquisition and a token-revalidated write-back, so a slow provider
/// never serializes unrelated requests. `tick` may be invoked concurrently;
/// a job can be executed more than once under lease expiry, but exactly one
/// execution's result is ever committed.
pub(crate) struct AiJobEngine {
    cfg: FleetConfig,
    clock: Arc<dyn Clock>,
    bus: fleet_events::Bus,
    hazards: Arc<HazardLedger>,
    reputation: Arc<ReputationLedger>,
    policy_ledger: Arc<PolicyDecisionLedger>,
    renderer: Arc<dyn SnapshotRenderer>,
    provider: Arc<dyn AuditProvider>,
    boot_time: DateTime<Utc>,
    inner: Mutex<EngineState>,
}

impl AiJobEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cfg: FleetConfig,
        clock: Arc<dyn Clock>,
        bus: fleet_events::Bus,
        hazards: Arc<HazardLedger>,
        reputation: Arc<ReputationLedger>,
        policy_ledger: Arc<PolicyDecisionLedger>,
        renderer: Arc<dyn SnapshotRenderer>,
        provider: Arc<dyn AuditProvider>,
    ) -> Self {
        let boot_time = clock.now();
        Self {
            cfg,
            clock,
            bus,
            hazards,
            reputation,
            policy_ledger,
            renderer,
            provider,
            boot_time,
            inner: Mutex::new(EngineState::default()),
        }
    }

    /// Creates a job, or returns the identity of an existing one: a live
    /// (PENDING/IN_PROGRESS) holder of the dedup key is always reused, and a
    /// terminal holder is reused while its creation falls inside the dedup
    /// window.
    pub(crate) fn create_job(
        &self,
        incident_id: &str,
        job_type: AiJobType,
    ) -> Result<JobView, StoreError> {
        if self.hazards.incident(incident_id).is_none() {
            return Err(StoreError::NotFound("incident"));
        }
        let now = self.clock.now();
        let dedup_key = format!("{}:{}", job_type.as_str(), incident_id);
        let view = {
            let mut state = self.inner.lock();
            if let Some(existing_id) = state.by_dedup.get(&dedup_key).cloned() {
                if let Some(job) = state.jobs.get(&existing_id) {
                    let reuse = match job.status {
                        AiJobStatus::Pending | AiJobStatus::InProgress => true,
                        AiJobStatus::Completed | AiJobStatus::Failed => {
                            (now - job.created_at).num_seconds()
                                < self.cfg.ai_dedup_window_secs as i64
                        }
                    };
                    if reuse {
                        return Ok(job.view());
                    }
                }
            }
            let job = AiJob {
                ai_job_id: uuid::Uuid::new_v4().to_string(),
                ai_job_type: job_type,
                incident_id: incident_id.to_string(),
                status: AiJobStatus::Pending,
                lease_token: None,
                lease_expires_at: None,
                created_at: now,
                ai_report_id: None,
                result: None,
            };
            let view = job.view();
            state.by_dedup.insert(dedup_key, job.ai_job_id.clone());
            state.order.push(job.ai_job_id.clone());
            state.jobs.insert(job.ai_job_id.clone(), job);
            view
        };
        self.bus.publish(
            topics::TOPIC_AI_JOBS_CREATED,
            &json!({"ai_job_id": view.ai_job_id, "incident_id": incident_id, "ai_job_type": job_type.as_str()}),
        );
        Ok(view)
    }

    /// One pull of the engine. Pulled by callers (admin endpoint, background
    /// poller, tests); the engine schedules nothing itself.
    pub(crate) async fn tick(&self, max_jobs: usize) -> TickSummary {
        let now = self.clock.now();
        let mut summary = TickSummary::default();

        let grants: Vec<LeaseGrant> = {
            let mut state = self.inner.lock();
            self.roll_budget_bucket(&mut state, now);
            let lease_until = now + chrono::Duration::seconds(self.cfg.ai_lease_secs as i64);
            let order = state.order.clone();
            let mut grants = Vec::new();
            for job_id in order {
                if grants.len() >= max_jobs {
                    break;
                }
                let at_budget = state.daily_calls >= self.cfg.ai_daily_budget;
                let Some(job) = state.jobs.get_mut(&job_id) else {
                    continue;
                };
                let eligible = match job.status {
                    AiJobStatus::Pending => true,
                    // An expired lease means the previous holder is
                    // presumed lost; re-acquisition invalidates its token.
                    AiJobStatus::InProgress => job.lease_expires_at.is_some_and(|t| t <= now),
                    _ => false,
                };
                if !eligible {
                    continue;
                }
                if at_budget {
                    summary.skipped_budget += 1;
                    continue;
                }
                let token = uuid::Uuid::new_v4().to_string();
                job.status = AiJobStatus::InProgress;
                job.lease_token = Some(token.clone());
                job.lease_expires_at = Some(lease_until);
                grants.push(LeaseGrant {
                    job_id: job_id.clone(),
                    token,
                    job_type: job.ai_job_type,
                    incident_id: job.incident_id.clone(),
                });
            }
            grants
        };
        summary.leased = grants.len();

        for grant in grants {
            // Slow external work happens here, with no engine lock held.
            let incident = self.hazards.incident(&grant.incident_id);
            let outcome = match incident {
                None => AuditOutcome::Failed(AuditReport::failure("incident record missing")),
                Some(ref record) => match self.renderer.render(&record.snapshot_ref).await {
                    Ok(bytes) => self.provider.audit(grant.job_type, record, &bytes).await,
                    Err(err) => {
                        AuditOutcome::Failed(AuditReport::failure(format!(
                            "snapshot render failed: {err}"
                        )))
                    }
                },
            };
            self.commit(&grant, incident.as_ref(), outcome, &mut summary);
        }
        summary
    }

    pub(crate) fn get_job_by_report_id(&self, ai_report_id: &str) -> Option<JobView> {
        let state = self.inner.lock();
        let job_id = state.by_report.get(ai_report_id)?;
        state.jobs.get(job_id).map(AiJob::view)
    }

    pub(crate) fn get_job(&self, ai_job_id: &str) -> Option<JobView> {
        self.inner.lock().jobs.get(ai_job_id).map(AiJob::view)
    }

    /// Newest-first job views.
    pub(crate) fn list_jobs(&self, limit: usize) -> Vec<JobView> {
        let state = self.inner.lock();
        state
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.jobs.get(id).map(AiJob::view))
            .collect()
    }

    fn roll_budget_bucket(&self, state: &mut EngineState, now: DateTime<Utc>) {
        let elapsed = (now - self.boot_time).num_seconds().max(0) as u64;
        let bucket = elapsed / self.cfg.ai_day_secs.max(1);
        if bucket != state.budget_bucket {
            state.budget_bucket = bucket;
            state.daily_calls = 0;
            tracing::debug!(bucket, "daily AI call counter reset");
        }
    }

    /// Token-revalidated write-back. A result whose lease token is no longer
    /// current belongs to a superseded execution and is discarded entirely:
    /// no state mutation, no budget increment.
    fn commit(
        &self,
        grant: &LeaseGrant,
        incident: Option<&IncidentRecord>,
        outcome: AuditOutcome,
        summary: &mut TickSummary,
    ) {
        let (completed, report) = match outcome {
            AuditOutcome::Completed(report) => (true, report),
            AuditOutcome::Failed(report) => (false, report),
        };
        let report_id = {
            let mut state = self.inner.lock();
            let Some(job) = state.jobs.get_mut(&grant.job_id) else {
                return;
            };
            if job.lease_token.as_deref() != Some(grant.token.as_str()) {
                metrics::counter!("fleet_ai_stale_discard").increment(1);
                tracing::debug!(job_id = %grant.job_id, "discarding superseded execution result");
                return;
            }
            job.status = if completed {
                AiJobStatus::Completed
            } else {
                AiJobStatus::Failed
            };
            let report_id = job
                .ai_report_id
                .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
                .clone();
            job.result = Some(report.clone());
            job.lease_token = None;
            job.lease_expires_at = None;
            state
                .by_report
                .insert(report_id.clone(), grant.job_id.clone());
            state.daily_calls += 1;
            report_id
        };

        if completed {
            summary.completed += 1;
            metrics::counter!("fleet_ai_jobs_completed").increment(1);
            self.bus.publish(
                topics::TOPIC_AI_JOBS_COMPLETED,
                &json!({"ai_job_id": grant.job_id, "ai_report_id": report_id}),
            );
            match grant.job_type {
                AiJobType::VisionAudit => {
                    if let Some(record) = incident {
                        if let Some(ref obstacle) = report.obstacle_type {
                            self.hazards.note_audit_obstacle(&record.segment_id, obstacle);
                        }
                        self.reputation
                            .record_event(&record.joykey, 1, "ai_audit_confirmed");
                    }
                }
                AiJobType::PolicySuggest => {
                    self.policy_ledger.record_suggested(&report_id);
                }
            }
        } else {
            summary.failed += 1;
            metrics::counter!("fleet_ai_jobs_failed").increment(1);
            self.bus.publish(
                topics::TOPIC_AI_JOBS_FAILED,
                &json!({"ai_job_id": grant.job_id, "ai_report_id": report_id, "summary": report.summary}),
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn daily_calls(&self) -> u32 {
        self.inner.lock().daily_calls
    }
}
