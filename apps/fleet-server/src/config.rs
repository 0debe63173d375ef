use tracing::warn;

/// Immutable tunables for the store, read from the environment once at
/// startup and passed into the subsystems. Nothing below re-reads env vars
/// after boot.
#[derive(Debug, Clone)]
pub(crate) struct FleetConfig {
    /// Exclusive claim duration for one AI job execution attempt.
    pub ai_lease_secs: u64,
    /// Window in which a repeated job request reuses an existing terminal job.
    pub ai_dedup_window_secs: u64,
    /// Maximum provider calls committed per budget day.
    pub ai_daily_budget: u32,
    /// Length of a budget day. Compressed in tests to exercise resets.
    pub ai_day_secs: u64,
    /// Maximum live sandbox sessions before LRU eviction kicks in.
    pub max_sandboxes: usize,
    /// Idle time after which a sandbox is evicted ahead of fresher sessions.
    pub sandbox_ttl_secs: u64,
    /// Rate limit window length per sandbox.
    pub rate_window_secs: u64,
    /// Requests admitted per sandbox per window.
    pub rate_max_requests: u32,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            ai_lease_secs: 30,
            ai_dedup_window_secs: 300,
            ai_daily_budget: 50,
            ai_day_secs: 86_400,
            max_sandboxes: 64,
            sandbox_ttl_secs: 1_800,
            rate_window_secs: 10,
            rate_max_requests: 60,
        }
    }
}

impl FleetConfig {
    pub(crate) fn from_env() -> Self {
        let d = Self::default();
        Self {
            ai_lease_secs: env_u64("FLEET_AI_LEASE_SECS", d.ai_lease_secs),
            ai_dedup_window_secs: env_u64("FLEET_AI_DEDUP_WINDOW_SECS", d.ai_dedup_window_secs),
            ai_daily_budget: env_u64("FLEET_AI_DAILY_BUDGET", d.ai_daily_budget as u64) as u32,
            ai_day_secs: env_u64("FLEET_AI_DAY_SECS", d.ai_day_secs).max(1),
            max_sandboxes: env_u64("FLEET_MAX_SANDBOXES", d.max_sandboxes as u64).max(1) as usize,
            sandbox_ttl_secs: env_u64("FLEET_SANDBOX_TTL_SECS", d.sandbox_ttl_secs),
            rate_window_secs: env_u64("FLEET_RATE_WINDOW_SECS", d.rate_window_secs).max(1),
            rate_max_requests: env_u64("FLEET_RATE_MAX_REQUESTS", d.rate_max_requests as u64)
                as u32,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparsable tunable; using default");
                default
            }
        },
        Err(_) => default,
    }
}
