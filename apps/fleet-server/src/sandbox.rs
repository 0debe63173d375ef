use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use crate::clock::Clock;
use crate::error::StoreError;
use fleet_topics as topics;

#[derive(Debug, Clone)]
struct Session {
    created_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SandboxView {
    pub sandbox_id: String,
    pub created_at: String,
    pub last_seen_at: String,
    /// True when this admission allocated a new session.
    pub fresh: bool,
}

/// Admits and evicts per-client isolated namespaces. Sessions are bounded by
/// capacity; idle-expired sessions are evicted ahead of any live one.
pub(crate) struct SandboxRegistry {
    clock: Arc<dyn Clock>,
    bus: fleet_events::Bus,
    capacity: usize,
    ttl: Duration,
    inner: Mutex<HashMap<String, Session>>,
}

impl SandboxRegistry {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        bus: fleet_events::Bus,
        capacity: usize,
        ttl_secs: u64,
    ) -> Self {
        Self {
            clock,
            bus,
            capacity: capacity.max(1),
            ttl: Duration::seconds(ttl_secs as i64),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Refreshes a known session or allocates a new one, evicting to stay
    /// within capacity. Surfaces `CapacityExceeded` rather than growing
    /// unbounded if eviction cannot free a slot.
    pub(crate) fn admit(&self, existing: Option<&str>) -> Result<SandboxView, StoreError> {
        let now = self.clock.now();
        let view = {
            let mut sessions = self.inner.lock();
            if let Some(id) = existing {
                if let Some(session) = sessions.get_mut(id) {
                    session.last_seen_at = now;
                    return Ok(view_of(id, session, false));
                }
            }

            while sessions.len() >= self.capacity {
                let Some(victim) = pick_victim(&sessions, now, self.ttl) else {
                    return Err(StoreError::CapacityExceeded);
                };
                sessions.remove(&victim);
                metrics::counter!("fleet_sandbox_evictions").increment(1);
                self.bus
                    .publish(topics::TOPIC_SANDBOX_EVICTED, &json!({"sandbox_id": victim}));
            }

            let id = uuid::Uuid::new_v4().to_string();
            let session = Session {
                created_at: now,
                last_seen_at: now,
            };
            let view = view_of(&id, &session, true);
            sessions.insert(id, session);
            view
        };
        self.bus.publish(
            topics::TOPIC_SANDBOX_ADMITTED,
            &json!({"sandbox_id": view.sandbox_id}),
        );
        Ok(view)
    }

    pub(crate) fn is_known(&self, id: &str) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub(crate) fn live_sessions(&self) -> usize {
        self.inner.lock().len()
    }
}

fn view_of(id: &str, session: &Session, fresh: bool) -> SandboxView {
    SandboxView {
        sandbox_id: id.to_string(),
        created_at: session.created_at.to_rfc3339(),
        last_seen_at: session.last_seen_at.to_rfc3339(),
        fresh,
    }
}

/// Expired-idle sessions are preferred victims regardless of recency rank;
/// otherwise the least-recently-seen session goes. Ties break on the smaller
/// sandbox id so eviction stays deterministic.
fn pick_victim(sessions: &HashMap<String, Session>, now: DateTime<Utc>, ttl: Duration) -> Option<String> {
    let expired = sessions
        .iter()
        .filter(|(_, s)| now - s.last_seen_at > ttl)
        .min_by(|a, b| {
            a.1.last_seen_at
                .cmp(&b.1.last_seen_at)
                .then_with(|| a.0.cmp(b.0))
        });
    let candidate = expired.or_else(|| {
        sessions.iter().min_by(|a, b| {
            a.1.last_seen_at
                .cmp(&b.1.last_seen_at)
                .then_with(|| a.0.cmp(b.0))
        })
    });
    candidate.map(|(id, _)| id.clone())
}
