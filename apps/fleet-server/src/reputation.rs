use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::Clock;
use crate::error::StoreError;
use fleet_topics as topics;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoreEvent {
    pub joykey: String,
    pub fleet_id: String,
    pub delta: i64,
    pub reason: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ReputationView {
    pub joykey: String,
    pub score: i64,
    pub events: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct VendorScore {
    pub fleet_id: String,
    pub score: i64,
    pub events: u64,
    pub updated_at: String,
}

#[derive(Default)]
struct RepState {
    events: Vec<ScoreEvent>,
    robots: HashMap<String, (i64, u64)>,
    vendors: HashMap<String, VendorScore>,
}

/// Append-only score events with per-robot and per-vendor aggregates.
/// Vendor attribution uses the `fleet:robot` joykey convention; keys without
/// a fleet prefix land under "unaffiliated".
pub(crate) struct ReputationLedger {
    clock: Arc<dyn Clock>,
    bus: fleet_events::Bus,
    inner: Mutex<RepState>,
}

pub(crate) fn fleet_of(joykey: &str) -> &str {
    match joykey.split_once(':') {
        Some((fleet, _)) if !fleet.is_empty() => fleet,
        _ => "unaffiliated",
    }
}

impl ReputationLedger {
    pub(crate) fn new(clock: Arc<dyn Clock>, bus: fleet_events::Bus) -> Self {
        Self {
            clock,
            bus,
            inner: Mutex::new(RepState::default()),
        }
    }

    pub(crate) fn record_event(&self, joykey: &str, delta: i64, reason: &str) {
        let ts = self.clock.now().to_rfc3339();
        let fleet_id = fleet_of(joykey).to_string();
        let event = ScoreEvent {
            joykey: joykey.to_string(),
            fleet_id: fleet_id.clone(),
            delta,
            reason: reason.to_string(),
            ts: ts.clone(),
        };
        {
            let mut state = self.inner.lock();
            let robot = state.robots.entry(joykey.to_string()).or_insert((0, 0));
            robot.0 += delta;
            robot.1 += 1;
            let vendor = state
                .vendors
                .entry(fleet_id.clone())
                .or_insert_with(|| VendorScore {
                    fleet_id: fleet_id.clone(),
                    score: 0,
                    events: 0,
                    updated_at: ts.clone(),
                });
            vendor.score += delta;
            vendor.events += 1;
            vendor.updated_at = ts;
            state.events.push(event.clone());
        }
        self.bus.publish(topics::TOPIC_REPUTATION_EVENT, &event);
    }

    pub(crate) fn reputation_for(&self, joykey: &str) -> Result<ReputationView, StoreError> {
        let state = self.inner.lock();
        let (score, events) = state
            .robots
            .get(joykey)
            .copied()
            .ok_or(StoreError::NotFound("joykey"))?;
        Ok(ReputationView {
            joykey: joykey.to_string(),
            score,
            events,
        })
    }

    /// Newest-first slice of the event ledger.
    pub(crate) fn list_events(&self, limit: usize) -> Vec<ScoreEvent> {
        let state = self.inner.lock();
        state.events.iter().rev().take(limit).cloned().collect()
    }

    pub(crate) fn vendor_scores(&self, fleet_id: Option<&str>) -> Vec<VendorScore> {
        let state = self.inner.lock();
        let mut scores: Vec<VendorScore> = match fleet_id {
            Some(id) => state.vendors.get(id).cloned().into_iter().collect(),
            None => state.vendors.values().cloned().collect(),
        };
        scores.sort_by(|a, b| a.fleet_id.cmp(&b.fleet_id));
        scores
    }
}
