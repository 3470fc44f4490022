use crate::defense::config::DefenseConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tracing::{error, warn};
use uuid::Uuid;

/// Number of recent events carried in an alarm snapshot.
const SNAPSHOT_TAIL: usize = 10;

/// One observed attempt inside a sliding window. `counterpart` is the
/// account for an address window and the address for an account window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowEvent {
    pub at: u64,
    pub counterpart: String,
    pub success: bool,
}

/// Sliding-window record for one address or one account.
#[derive(Debug, Default)]
struct WindowRecord {
    events: Vec<WindowEvent>,
    distinct_counterparts: HashSet<String>,
    last_alarm_at: Option<u64>,
    last_seen: u64,
}

impl WindowRecord {
    /// Append an event, then drop everything older than the window and
    /// rebuild the distinct-counterpart set from what remains.
    fn ingest(&mut self, event: WindowEvent, window_ms: u64) {
        let now = event.at;
        self.events.push(event);
        self.events.retain(|e| now.saturating_sub(e.at) <= window_ms);
        self.distinct_counterparts = self
            .events
            .iter()
            .map(|e| e.counterpart.clone())
            .collect();
        self.last_seen = now;
    }

    fn failed_count(&self) -> usize {
        self.events.iter().filter(|e| !e.success).count()
    }
}

/// Why an alarm fired. All matched reasons ride on a single alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AlarmReason {
    FailedAttemptsPerAddress { count: usize },
    DistinctAccountsPerAddress { count: usize },
    DistinctAddressesPerAccount { count: usize },
}

/// Immutable snapshot handed to alarm sinks. Built while the window lock
/// is held, delivered after it is released.
#[derive(Debug, Clone, Serialize)]
pub struct AlarmSnapshot {
    pub id: Uuid,
    pub address: String,
    pub account: String,
    pub reasons: Vec<AlarmReason>,
    pub failed_attempts: usize,
    pub distinct_accounts: usize,
    pub distinct_addresses: usize,
    /// Bounded tail of the address window, most recent last.
    pub recent_events: Vec<WindowEvent>,
    pub at: u64,
}

/// Receives alarm snapshots. Implementations must never block the attempt
/// pipeline; failures are logged and swallowed.
pub trait AlarmSink: Send + Sync {
    fn notify(&self, alarm: &AlarmSnapshot);
}

/// Logs alarms through tracing.
pub struct TracingSink;

impl AlarmSink for TracingSink {
    fn notify(&self, alarm: &AlarmSnapshot) {
        warn!(
            id = %alarm.id,
            address = %alarm.address,
            account = %alarm.account,
            reasons = ?alarm.reasons,
            "Coordinated abuse suspected"
        );
    }
}

/// Appends one JSON line per alarm to a file.
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    /// # Errors
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AlarmSink for FileSink {
    fn notify(&self, alarm: &AlarmSnapshot) {
        let line = match serde_json::to_string(alarm) {
            Ok(line) => line,
            Err(err) => {
                error!("Failed to serialize alarm: {}", err);
                return;
            }
        };
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "{line}") {
                    error!("Failed to write alarm log: {}", err);
                }
            }
            Err(err) => error!("Alarm log lock poisoned: {}", err),
        }
    }
}

/// Sliding-window analysis across identities. Flags an address once any of
/// three counts crosses its threshold: failed attempts from the address,
/// distinct accounts probed by the address, distinct addresses probing one
/// account. Alarms per address are rate limited by a cooldown.
pub struct AnomalyDetector {
    addresses: DashMap<String, WindowRecord>,
    accounts: DashMap<String, WindowRecord>,
    window_ms: u64,
    cooldown_ms: u64,
    failed_attempts_per_address: usize,
    distinct_accounts_per_address: usize,
    distinct_addresses_per_account: usize,
}

impl AnomalyDetector {
    #[must_use]
    pub fn new(cfg: &DefenseConfig) -> Self {
        Self {
            addresses: DashMap::new(),
            accounts: DashMap::new(),
            window_ms: cfg.anomaly_window_ms,
            cooldown_ms: cfg.alarm_cooldown_ms,
            failed_attempts_per_address: cfg.failed_attempts_per_address,
            distinct_accounts_per_address: cfg.distinct_accounts_per_address,
            distinct_addresses_per_account: cfg.distinct_addresses_per_account,
        }
    }

    /// Ingest one attempt outcome. Returns a snapshot when the thresholds
    /// fire and the address is outside its alarm cooldown; the caller is
    /// expected to deliver it to the sinks without holding any lock.
    pub fn observe(
        &self,
        address: &str,
        account: &str,
        success: bool,
        now: u64,
    ) -> Option<AlarmSnapshot> {
        let distinct_addresses = {
            let mut record = self.accounts.entry(account.to_string()).or_default();
            record.ingest(
                WindowEvent {
                    at: now,
                    counterpart: address.to_string(),
                    success,
                },
                self.window_ms,
            );
            record.distinct_counterparts.len()
        };

        let mut record = self.addresses.entry(address.to_string()).or_default();
        record.ingest(
            WindowEvent {
                at: now,
                counterpart: account.to_string(),
                success,
            },
            self.window_ms,
        );

        let failed_attempts = record.failed_count();
        let distinct_accounts = record.distinct_counterparts.len();

        let mut reasons = Vec::new();
        if failed_attempts >= self.failed_attempts_per_address {
            reasons.push(AlarmReason::FailedAttemptsPerAddress {
                count: failed_attempts,
            });
        }
        if distinct_accounts >= self.distinct_accounts_per_address {
            reasons.push(AlarmReason::DistinctAccountsPerAddress {
                count: distinct_accounts,
            });
        }
        if distinct_addresses >= self.distinct_addresses_per_account {
            reasons.push(AlarmReason::DistinctAddressesPerAccount {
                count: distinct_addresses,
            });
        }

        if reasons.is_empty() {
            return None;
        }

        let in_cooldown = record
            .last_alarm_at
            .is_some_and(|last| now.saturating_sub(last) < self.cooldown_ms);
        if in_cooldown {
            return None;
        }
        record.last_alarm_at = Some(now);

        let tail_start = record.events.len().saturating_sub(SNAPSHOT_TAIL);
        Some(AlarmSnapshot {
            id: Uuid::new_v4(),
            address: address.to_string(),
            account: account.to_string(),
            reasons,
            failed_attempts,
            distinct_accounts,
            distinct_addresses,
            recent_events: record.events[tail_start..].to_vec(),
            at: now,
        })
    }

    /// Evict windows idle beyond `ttl_ms`. Called by the reaper.
    pub fn sweep(&self, now: u64, ttl_ms: u64) -> usize {
        // counted inside the retain closures; a len() delta would race
        // with concurrent observes
        let dropped = AtomicUsize::new(0);
        let keep_or_count = |record: &WindowRecord| {
            let keep = now.saturating_sub(record.last_seen) <= ttl_ms;
            if !keep {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            keep
        };
        self.addresses.retain(|_, record| keep_or_count(record));
        self.accounts.retain(|_, record| keep_or_count(record));
        dropped.into_inner()
    }

    #[must_use]
    pub fn tracked_windows(&self) -> usize {
        self.addresses.len() + self.accounts.len()
    }
}
