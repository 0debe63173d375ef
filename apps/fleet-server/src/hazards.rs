use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::segments::is_valid_segment_id;
use fleet_topics as topics;

/// Only evidence refs kept per hazard record; older refs roll off.
const EVIDENCE_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum HazardStatus {
    Open,
    SoftBlocked,
    HardBlocked,
}

/// Internal incident record; also handed to the audit provider.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct IncidentRecord {
    pub incident_id: String,
    pub joykey: String,
    pub segment_id: String,
    pub incident_type: String,
    pub snapshot_ref: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
struct HazardRecord {
    segment_id: String,
    hazard_status: HazardStatus,
    obstacle_type: Option<String>,
    evidence_refs: Vec<String>,
    updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct HazardView {
    pub segment_id: String,
    pub hazard_status: HazardStatus,
    pub obstacle_type: Option<String>,
    pub evidence_refs: Vec<String>,
    pub updated_at: String,
}

#[derive(Default)]
struct LedgerState {
    incidents: HashMap<String, IncidentRecord>,
    hazards: HashMap<String, HazardRecord>,
}

/// Incident reports and hazard status records. Incidents are immutable after
/// creation; hazard records are upserted per segment.
pub(crate) struct HazardLedger {
    clock: Arc<dyn Clock>,
    bus: fleet_events::Bus,
    inner: Mutex<LedgerState>,
}

impl HazardLedger {
    pub(crate) fn new(clock: Arc<dyn Clock>, bus: fleet_events::Bus) -> Self {
        Self {
            clock,
            bus,
            inner: Mutex::new(LedgerState::default()),
        }
    }

    /// Creates an incident and upserts the hazard record for its segment.
    /// An incident type mentioning "hard" hard-blocks the segment; anything
    /// else soft-blocks it.
    pub(crate) fn report_blocked_incident(
        &self,
        joykey: &str,
        segment_id: &str,
        incident_type: &str,
        snapshot_ref: &str,
    ) -> Result<IncidentRecord, StoreError> {
        if joykey.trim().is_empty() {
            return Err(StoreError::validation("joykey", "must not be empty"));
        }
        if !is_valid_segment_id(segment_id) {
            return Err(StoreError::validation(
                "segment_id",
                format!("{segment_id:?} is not a cell id"),
            ));
        }
        let now = self.clock.now().to_rfc3339();
        let incident = IncidentRecord {
            incident_id: uuid::Uuid::new_v4().to_string(),
            joykey: joykey.to_string(),
            segment_id: segment_id.to_string(),
            incident_type: incident_type.to_string(),
            snapshot_ref: snapshot_ref.to_string(),
            created_at: now.clone(),
        };
        let status = if incident_type.to_ascii_lowercase().contains("hard") {
            HazardStatus::HardBlocked
        } else {
            HazardStatus::SoftBlocked
        };
        {
            let mut state = self.inner.lock();
            state
                .incidents
                .insert(incident.incident_id.clone(), incident.clone());
            let record = state
                .hazards
                .entry(segment_id.to_string())
                .or_insert_with(|| HazardRecord {
                    segment_id: segment_id.to_string(),
                    hazard_status: HazardStatus::Open,
                    obstacle_type: None,
                    evidence_refs: Vec::new(),
                    updated_at: now.clone(),
                });
            record.hazard_status = status;
            record.updated_at = now.clone();
            record.evidence_refs.push(snapshot_ref.to_string());
            if record.evidence_refs.len() > EVIDENCE_CAP {
                let drop = record.evidence_refs.len() - EVIDENCE_CAP;
                record.evidence_refs.drain(..drop);
            }
        }
        self.bus.publish(
            topics::TOPIC_INCIDENTS_REPORTED,
            &json!({
                "incident_id": incident.incident_id,
                "segment_id": segment_id,
                "joykey": joykey,
                "incident_type": incident_type,
            }),
        );
        self.bus.publish(
            topics::TOPIC_HAZARDS_UPDATED,
            &json!({"segment_id": segment_id, "hazard_status": status}),
        );
        Ok(incident)
    }

    pub(crate) fn incident(&self, incident_id: &str) -> Option<IncidentRecord> {
        self.inner.lock().incidents.get(incident_id).cloned()
    }

    /// Stamps the obstacle type a committed vision audit identified.
    pub(crate) fn note_audit_obstacle(&self, segment_id: &str, obstacle_type: &str) {
        let now = self.clock.now().to_rfc3339();
        let mut state = self.inner.lock();
        if let Some(record) = state.hazards.get_mut(segment_id) {
            record.obstacle_type = Some(obstacle_type.to_string());
            record.updated_at = now;
        }
    }

    /// Returns only well-formed records. A malformed record is an internal
    /// fault, never silently passed through.
    pub(crate) fn list_hazards(&self) -> Result<Vec<HazardView>, StoreError> {
        let state = self.inner.lock();
        let mut views = Vec::with_capacity(state.hazards.len());
        for record in state.hazards.values() {
            if record.segment_id.is_empty() || record.updated_at.is_empty() {
                return Err(StoreError::Invariant(format!(
                    "hazard record for {:?} is malformed",
                    record.segment_id
                )));
            }
            views.push(HazardView {
                segment_id: record.segment_id.clone(),
                hazard_status: record.hazard_status,
                obstacle_type: record.obstacle_type.clone(),
                evidence_refs: record.evidence_refs.clone(),
                updated_at: record.updated_at.clone(),
            });
        }
        views.sort_by(|a, b| a.segment_id.cmp(&b.segment_id));
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test::ManualClock;

    fn ledger() -> HazardLedger {
        HazardLedger::new(Arc::new(ManualClock::epoch()), fleet_events::Bus::new(16))
    }

    #[test]
    fn report_creates_incident_and_hazard() {
        let ledger = ledger();
        let incident = ledger
            .report_blocked_incident("bot-1", "cell_3_4", "obstacle", "snap-1")
            .expect("report");
        assert_eq!(incident.segment_id, "cell_3_4");
        assert!(ledger.incident(&incident.incident_id).is_some());

        let hazards = ledger.list_hazards().expect("hazards");
        assert_eq!(hazards.len(), 1);
        assert_eq!(hazards[0].hazard_status, HazardStatus::SoftBlocked);
        assert_eq!(hazards[0].evidence_refs, vec!["snap-1"]);
    }

    #[test]
    fn hard_incident_hard_blocks_the_segment() {
        let ledger = ledger();
        ledger
            .report_blocked_incident("bot-1", "cell_3_4", "hard_block", "snap-1")
            .expect("report");
        let hazards = ledger.list_hazards().expect("hazards");
        assert_eq!(hazards[0].hazard_status, HazardStatus::HardBlocked);
    }

    #[test]
    fn malformed_segment_is_rejected_at_the_boundary() {
        let ledger = ledger();
        let err = ledger
            .report_blocked_incident("bot-1", "cell__1_2", "obstacle", "snap-1")
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert!(ledger.list_hazards().expect("hazards").is_empty());
    }

    #[test]
    fn repeated_reports_accumulate_capped_evidence() {
        let ledger = ledger();
        for i in 0..12 {
            ledger
                .report_blocked_incident("bot-1", "cell_1_1", "obstacle", &format!("snap-{i}"))
                .expect("report");
        }
        let hazards = ledger.list_hazards().expect("hazards");
        assert_eq!(hazards[0].evidence_refs.len(), EVIDENCE_CAP);
        assert_eq!(hazards[0].evidence_refs[0], "snap-2");
    }

    #[test]
    fn audit_obstacle_is_stamped() {
        let ledger = ledger();
        ledger
            .report_blocked_incident("bot-1", "cell_1_1", "obstacle", "snap-1")
            .expect("report");
        ledger.note_audit_obstacle("cell_1_1", "pallet");
        let hazards = ledger.list_hazards().expect("hazards");
        assert_eq!(hazards[0].obstacle_type.as_deref(), Some("pallet"));
    }
}
