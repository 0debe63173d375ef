use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;

/// Keep the counter map from accumulating entries for long-gone sandboxes.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    bucket: u64,
    count: u32,
}

/// Per-sandbox fixed-window admission control. Denial is a pure signal; the
/// HTTP layer maps it to a 429. No retry, no queuing.
pub(crate) struct RateLimiter {
    clock: Arc<dyn Clock>,
    window_secs: u64,
    max_requests: u32,
    inner: Mutex<HashMap<String, WindowCounter>>,
}

impl RateLimiter {
    pub(crate) fn new(clock: Arc<dyn Clock>, window_secs: u64, max_requests: u32) -> Self {
        Self {
            clock,
            window_secs: window_secs.max(1),
            max_requests,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn allow(&self, sandbox_id: &str) -> bool {
        let bucket = self.clock.now().timestamp().max(0) as u64 / self.window_secs;
        let mut counters = self.inner.lock();
        if counters.len() > PRUNE_THRESHOLD {
            counters.retain(|_, c| c.bucket == bucket);
        }
        let counter = counters
            .entry(sandbox_id.to_string())
            .or_insert(WindowCounter { bucket, count: 0 });
        if counter.bucket != bucket {
            counter.bucket = bucket;
            counter.count = 0;
        }
        if counter.count >= self.max_requests {
            metrics::counter!("fleet_rate_limited").increment(1);
            return false;
        }
        counter.count += 1;
        true
    }
}
