use crate::defense::{anomaly::AnomalyDetector, config::DefenseConfig, now_ms, store::AttemptStore};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tracing::debug;

/// Periodic sweep evicting stale records from the attempt store and the
/// anomaly windows. Eviction is a pure function of idle time; reporting
/// is a debug log line, nothing more.
pub struct Reaper {
    store: Arc<AttemptStore>,
    anomaly: Option<Arc<AnomalyDetector>>,
    ttl_ms: u64,
    interval_ms: u64,
}

impl Reaper {
    #[must_use]
    pub fn new(cfg: &DefenseConfig, store: Arc<AttemptStore>) -> Self {
        Self {
            store,
            anomaly: None,
            ttl_ms: cfg.eviction_ttl_ms,
            interval_ms: cfg.reaper_interval_ms,
        }
    }

    #[must_use]
    pub fn with_anomaly(mut self, anomaly: Arc<AnomalyDetector>) -> Self {
        self.anomaly = Some(anomaly);
        self
    }

    /// One sweep over weakly consistent snapshots of the stores. Returns
    /// the number of evicted records. Permanently locked identities are
    /// never evicted; dropping them would forget a terminal state.
    pub fn sweep(&self, now: u64) -> usize {
        // counted inside the retain closure; a len() delta would race with
        // concurrent inserts
        let dropped = AtomicUsize::new(0);
        self.store.retain(|_, state| {
            let keep = state.permanently_locked
                || now.saturating_sub(state.last_attempt_at) <= self.ttl_ms;
            if !keep {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        let mut evicted = dropped.into_inner();

        if let Some(anomaly) = &self.anomaly {
            evicted += anomaly.sweep(now, self.ttl_ms);
        }
        evicted
    }

    /// Run the sweep on its own timer until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(self.interval_ms));
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = self.sweep(now_ms());
                if evicted > 0 {
                    debug!(evicted, "Reaper sweep");
                }
            }
        })
    }
}
