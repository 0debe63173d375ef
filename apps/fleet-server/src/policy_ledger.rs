use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::clock::Clock;
use fleet_topics as topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum PolicyDecisionKind {
    PolicySuggested,
    PolicyApplied,
}

#[derive(Debug, Clone, Serialize)]
struct PolicyDecisionEntry {
    ai_report_id: String,
    decision: PolicyDecisionKind,
    ts: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApplyResult {
    pub ai_report_id: String,
    pub already_applied: bool,
    pub ts: String,
}

/// Append-only record of suggestion/application decisions, joined to jobs by
/// `ai_report_id`. Application is bookkeeping only; it never touches
/// incident, hazard, or hold state.
pub(crate) struct PolicyDecisionLedger {
    clock: Arc<dyn Clock>,
    bus: fleet_events::Bus,
    inner: Mutex<Vec<PolicyDecisionEntry>>,
}

impl PolicyDecisionLedger {
    pub(crate) fn new(clock: Arc<dyn Clock>, bus: fleet_events::Bus) -> Self {
        Self {
            clock,
            bus,
            inner: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn record_suggested(&self, ai_report_id: &str) {
        let ts = self.clock.now().to_rfc3339();
        self.inner.lock().push(PolicyDecisionEntry {
            ai_report_id: ai_report_id.to_string(),
            decision: PolicyDecisionKind::PolicySuggested,
            ts,
        });
        self.bus.publish(
            topics::TOPIC_POLICY_SUGGESTION_RECORDED,
            &json!({"ai_report_id": ai_report_id}),
        );
    }

    pub(crate) fn has_policy_suggested(&self, ai_report_id: &str) -> bool {
        self.inner.lock().iter().any(|e| {
            e.ai_report_id == ai_report_id && e.decision == PolicyDecisionKind::PolicySuggested
        })
    }

    /// Appends a POLICY_APPLIED entry. A repeat apply for the same report id
    /// appends nothing and is reported as `already_applied`.
    pub(crate) fn apply_policy_suggestion_ledger_only(&self, ai_report_id: &str) -> ApplyResult {
        let ts = self.clock.now().to_rfc3339();
        let already_applied = {
            let mut entries = self.inner.lock();
            let applied = entries.iter().any(|e| {
                e.ai_report_id == ai_report_id && e.decision == PolicyDecisionKind::PolicyApplied
            });
            if !applied {
                entries.push(PolicyDecisionEntry {
                    ai_report_id: ai_report_id.to_string(),
                    decision: PolicyDecisionKind::PolicyApplied,
                    ts: ts.clone(),
                });
            }
            applied
        };
        if !already_applied {
            self.bus.publish(
                topics::TOPIC_POLICY_SUGGESTION_APPLIED,
                &json!({"ai_report_id": ai_report_id}),
            );
        }
        ApplyResult {
            ai_report_id: ai_report_id.to_string(),
            already_applied,
            ts,
        }
    }

    pub(crate) fn snapshot(&self) -> Value {
        let entries = self.inner.lock();
        json!({
            "count": entries.len(),
            "items": *entries,
        })
    }
}
