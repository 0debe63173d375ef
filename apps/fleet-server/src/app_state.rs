use std::sync::Arc;

use crate::ai_jobs::{AiJobEngine, AuditProvider, SnapshotRenderer};
use crate::clock::{Clock, SystemClock};
use crate::config::FleetConfig;
use crate::hazards::HazardLedger;
use crate::policy_ledger::PolicyDecisionLedger;
use crate::providers::{FsSnapshotRenderer, HeuristicAuditProvider, HttpAuditProvider};
use crate::rate_limit::RateLimiter;
use crate::reputation::ReputationLedger;
use crate::sandbox::SandboxRegistry;
use crate::segments::SegmentTrackCache;
use crate::webhooks::WebhookRegistry;

/// Shared handle wired through every route. Cloning is cheap; all stores are
/// behind `Arc`.
#[derive(Clone)]
pub(crate) struct AppState {
    clock: Arc<dyn Clock>,
    sandboxes: Arc<SandboxRegistry>,
    rate_limiter: Arc<RateLimiter>,
    segments: Arc<SegmentTrackCache>,
    hazards: Arc<HazardLedger>,
    reputation: Arc<ReputationLedger>,
    policy_ledger: Arc<PolicyDecisionLedger>,
    webhooks: Arc<WebhookRegistry>,
    ai_jobs: Arc<AiJobEngine>,
}

impl AppState {
    pub(crate) fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn sandboxes(&self) -> &SandboxRegistry {
        &self.sandboxes
    }

    pub(crate) fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub(crate) fn segments(&self) -> &SegmentTrackCache {
        &self.segments
    }

    pub(crate) fn hazards(&self) -> &HazardLedger {
        &self.hazards
    }

    pub(crate) fn reputation(&self) -> &ReputationLedger {
        &self.reputation
    }

    pub(crate) fn policy_ledger(&self) -> &PolicyDecisionLedger {
        &self.policy_ledger
    }

    pub(crate) fn webhooks(&self) -> &WebhookRegistry {
        &self.webhooks
    }

    pub(crate) fn ai_jobs(&self) -> &Arc<AiJobEngine> {
        &self.ai_jobs
    }
}

#[derive(Default)]
pub(crate) struct AppStateBuilder {
    cfg: Option<FleetConfig>,
    clock: Option<Arc<dyn Clock>>,
    renderer: Option<Arc<dyn SnapshotRenderer>>,
    provider: Option<Arc<dyn AuditProvider>>,
}

impl AppStateBuilder {
    pub(crate) fn with_config(mut self, cfg: FleetConfig) -> Self {
        self.cfg = Some(cfg);
        self
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn with_renderer(mut self, renderer: Arc<dyn SnapshotRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn with_provider(mut self, provider: Arc<dyn AuditProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub(crate) fn build(self) -> AppState {
        let cfg = self.cfg.unwrap_or_default();
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let bus = fleet_events::Bus::new(256);
        let renderer: Arc<dyn SnapshotRenderer> = self.renderer.unwrap_or_else(|| {
            let root = std::env::var("FLEET_SNAPSHOT_DIR").unwrap_or_else(|_| "snapshots".into());
            Arc::new(FsSnapshotRenderer::new(root))
        });
        let provider: Arc<dyn AuditProvider> = self.provider.unwrap_or_else(|| {
            match std::env::var("FLEET_AI_PROVIDER_URL") {
                Ok(endpoint) if !endpoint.trim().is_empty() => {
                    Arc::new(HttpAuditProvider::new(endpoint.trim()))
                }
                _ => Arc::new(HeuristicAuditProvider),
            }
        });

        let sandboxes = Arc::new(SandboxRegistry::new(
            clock.clone(),
            bus.clone(),
            cfg.max_sandboxes,
            cfg.sandbox_ttl_secs,
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            clock.clone(),
            cfg.rate_window_secs,
            cfg.rate_max_requests,
        ));
        let segments = Arc::new(SegmentTrackCache::new());
        let hazards = Arc::new(HazardLedger::new(clock.clone(), bus.clone()));
        let reputation = Arc::new(ReputationLedger::new(clock.clone(), bus.clone()));
        let policy_ledger = Arc::new(PolicyDecisionLedger::new(clock.clone(), bus.clone()));
        let webhooks = Arc::new(WebhookRegistry::new(clock.clone(), bus.clone()));
        let ai_jobs = Arc::new(AiJobEngine::new(
            cfg.clone(),
            clock.clone(),
            bus.clone(),
            hazards.clone(),
            reputation.clone(),
            policy_ledger.clone(),
            renderer,
            provider,
        ));

        AppState {
            clock,
            sandboxes,
            rate_limiter,
            segments,
            hazards,
            reputation,
            policy_ledger,
            webhooks,
            ai_jobs,
        }
    }
}
