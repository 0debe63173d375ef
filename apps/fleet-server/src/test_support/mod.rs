use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub(crate) mod env {
    use super::*;

    pub(crate) struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: HashMap<String, Option<String>>,
    }

    pub(crate) fn guard() -> EnvGuard {
        EnvGuard {
            _lock: ENV_LOCK.lock().expect("env lock poisoned"),
            saved: HashMap::new(),
        }
    }

    impl EnvGuard {
        fn remember(&mut self, key: &str) {
            self.saved
                .entry(key.to_string())
                .or_insert_with(|| std::env::var(key).ok());
        }

        pub(crate) fn set(&mut self, key: &str, value: impl AsRef<str>) {
            self.remember(key);
            std::env::set_var(key, value.as_ref());
        }

        pub(crate) fn set_opt(&mut self, key: &str, value: Option<&str>) {
            self.remember(key);
            match value {
                Some(val) => std::env::set_var(key, val),
                None => std::env::remove_var(key),
            }
        }

        pub(crate) fn remove(&mut self, key: &str) {
            self.set_opt(key, None);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain() {
                match value {
                    Some(val) => std::env::set_var(&key, val),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }
}

pub(crate) mod doubles {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::ai_jobs::{AuditOutcome, AuditProvider, AuditReport, AiJobType, SnapshotRenderer};
    use crate::hazards::IncidentRecord;

    pub(crate) struct StaticRenderer;

    #[async_trait]
    impl SnapshotRenderer for StaticRenderer {
        async fn render(&self, _snapshot_ref: &str) -> anyhow::Result<Vec<u8>> {
            Ok(vec![0x89, 0x50, 0x4e, 0x47])
        }
    }

    /// Provider that always returns the same scripted outcome.
    pub(crate) struct ScriptedProvider {
        outcome: AuditOutcome,
    }

    impl ScriptedProvider {
        pub(crate) fn ok(obstacle: &str) -> Self {
            Self {
                outcome: AuditOutcome::Completed(AuditReport {
                    summary: format!("audit identified {obstacle}"),
                    confidence: Some(0.9),
                    obstacle_type: Some(obstacle.to_string()),
                    sample_index: Some(0),
                }),
            }
        }

        pub(crate) fn invalid_json() -> Self {
            Self {
                outcome: AuditOutcome::Failed(AuditReport::failure("invalid JSON from provider")),
            }
        }
    }

    #[async_trait]
    impl AuditProvider for ScriptedProvider {
        async fn audit(
            &self,
            _job_type: AiJobType,
            _incident: &IncidentRecord,
            _image: &[u8],
        ) -> AuditOutcome {
            self.outcome.clone()
        }
    }

    /// Provider whose first call blocks until released; later calls complete
    /// immediately. Used to stage a lease-expiry race.
    pub(crate) struct GatedProvider {
        first_summary: String,
        later_summary: String,
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl GatedProvider {
        pub(crate) fn new(first_summary: &str, later_summary: &str) -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                first_summary: first_summary.to_string(),
                later_summary: later_summary.to_string(),
                calls: AtomicUsize::new(0),
                entered: Notify::new(),
                release: Notify::new(),
            })
        }

        pub(crate) async fn wait_for_first_call(&self) {
            self.entered.notified().await;
        }

        pub(crate) fn release(&self) {
            self.release.notify_one();
        }
    }

    #[async_trait]
    impl AuditProvider for GatedProvider {
        async fn audit(
            &self,
            _job_type: AiJobType,
            _incident: &IncidentRecord,
            _image: &[u8],
        ) -> AuditOutcome {
            let summary = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.release.notified().await;
                self.first_summary.clone()
            } else {
                self.later_summary.clone()
            };
            AuditOutcome::Completed(AuditReport {
                summary,
                confidence: Some(0.5),
                obstacle_type: Some("crate".to_string()),
                sample_index: Some(0),
            })
        }
    }
}
