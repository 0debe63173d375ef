use std::time::Duration;

use tokio::task::JoinHandle;

use crate::app_state::AppState;

/// Background puller for the AI job engine. The engine itself never
/// schedules; this loop (or the admin tick endpoint) drives it.
pub(crate) fn start_ai_tick_poller(
    state: AppState,
    interval_ms: u64,
    max_jobs: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(50)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let summary = state.ai_jobs().tick(max_jobs).await;
            if summary.leased > 0 {
                tracing::debug!(
                    leased = summary.leased,
                    completed = summary.completed,
                    failed = summary.failed,
                    skipped_budget = summary.skipped_budget,
                    "ai job tick"
                );
            }
        }
    })
}
