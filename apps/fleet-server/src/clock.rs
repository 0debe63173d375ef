use chrono::{DateTime, Utc};

/// Time source injected into every store subsystem so tests can drive a
/// deterministic clock instead of rebinding globals.
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
