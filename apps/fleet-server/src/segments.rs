use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

/// Global segment-pass cache cap. Oldest `last_passed_ts` entries are evicted
/// first once the cap is exceeded.
pub(crate) const SEGMENT_CACHE_CAP: usize = 200;

/// Per-robot track cap. Pure FIFO, duplicates count individually.
pub(crate) const TRACK_CAP: usize = 50;

/// Accepts exactly `cell_<nonneg-int>_<nonneg-int>`. Doubled separators,
/// signs, and non-numeric parts are all rejected.
pub(crate) fn is_valid_segment_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("cell_") else {
        return false;
    };
    let mut parts = rest.split('_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(x), Some(y), None) => is_nonneg_int(x) && is_nonneg_int(y),
        _ => false,
    }
}

fn is_nonneg_int(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SegmentPassedEntry {
    pub segment_id: String,
    pub last_passed_ts: f64,
    pub joykey: String,
    pub source: String,
}

#[derive(Default)]
struct SegmentState {
    passed: HashMap<String, SegmentPassedEntry>,
    tracks: HashMap<String, VecDeque<String>>,
}

/// Bounded map of segment-pass freshness plus per-robot track ring buffers.
/// One lock guards both; it is never held across I/O.
#[derive(Default)]
pub(crate) struct SegmentTrackCache {
    inner: Mutex<SegmentState>,
}

impl SegmentTrackCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a validated segment pass. Malformed ids are silently discarded
    /// and produce no side effect on either the cache or the track; returns
    /// whether the id was retained.
    pub(crate) fn record_segment_passed(
        &self,
        segment_id: &str,
        ts: f64,
        joykey: &str,
        source: &str,
    ) -> bool {
        if !is_valid_segment_id(segment_id) {
            return false;
        }
        let mut state = self.inner.lock();
        state.passed.insert(
            segment_id.to_string(),
            SegmentPassedEntry {
                segment_id: segment_id.to_string(),
                last_passed_ts: ts,
                joykey: joykey.to_string(),
                source: source.to_string(),
            },
        );
        if state.passed.len() > SEGMENT_CACHE_CAP {
            let overflow = state.passed.len() - SEGMENT_CACHE_CAP;
            let mut order: Vec<(f64, String)> = state
                .passed
                .values()
                .map(|e| (e.last_passed_ts, e.segment_id.clone()))
                .collect();
            // Smallest timestamp evicted first; ties broken by segment id.
            order.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            for (_, id) in order.into_iter().take(overflow) {
                state.passed.remove(&id);
            }
            metrics::counter!("fleet_segment_evictions").increment(overflow as u64);
        }

        let track = state.tracks.entry(joykey.to_string()).or_default();
        track.push_back(segment_id.to_string());
        while track.len() > TRACK_CAP {
            track.pop_front();
        }
        true
    }

    /// Most-recent-first view of the cache, at most `limit` entries.
    pub(crate) fn list_segment_passed_signals(&self, limit: usize) -> Vec<SegmentPassedEntry> {
        let state = self.inner.lock();
        let mut entries: Vec<SegmentPassedEntry> = state.passed.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.last_passed_ts
                .total_cmp(&a.last_passed_ts)
                .then_with(|| b.segment_id.cmp(&a.segment_id))
        });
        entries.truncate(limit);
        entries
    }

    pub(crate) fn track_for(&self, joykey: &str) -> Vec<String> {
        let state = self.inner.lock();
        state
            .tracks
            .get(joykey)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.inner.lock().passed.len()
    }
}
