pub mod anomaly;
pub mod challenge;
pub mod config;
pub mod lockout;
pub mod orchestrator;
pub mod rate_limit;
pub mod reaper;
pub mod store;

pub use anomaly::{AlarmSink, AlarmSnapshot, AnomalyDetector, FileSink, TracingSink};
pub use config::{BackoffPolicy, DefenseConfig, DefenseSet, LockoutPolicy};
pub use orchestrator::{Attempt, DefenseError, Orchestrator, Verdict};
pub use reaper::Reaper;
pub use store::{AttemptStore, DefenseState};

use std::time::{SystemTime, UNIX_EPOCH};

/// Credential verifier the engine consults once all gates pass.
pub trait CredentialVerifier: Send + Sync {
    fn check(&self, account: &str, secret: &str) -> bool;
}

/// Milliseconds since the unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Whole seconds until `until`, rounded up.
#[must_use]
pub fn remaining_secs(until: u64, now: u64) -> u64 {
    until.saturating_sub(now).div_ceil(1000)
}
