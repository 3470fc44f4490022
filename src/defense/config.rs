use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr};

/// Delay growth applied by the rate limiter after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// `base * failed_attempts`
    Linear,
    /// `min(base * multiplier^failed_attempts, max_delay)`
    Exponential { multiplier: f64 },
}

/// How lock durations evolve over repeated lockouts of the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LockoutPolicy {
    /// Every lockout lasts `base_lockout_ms`.
    Fixed,
    /// `min(base * multiplier^(lockout_count - 1), max_lockout_ms)`
    Progressive { multiplier: f64 },
}

/// Tunables for every defense component. All durations are milliseconds.
///
/// Every field has a default so a config file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefenseConfig {
    // rate limiter
    pub base_delay_ms: u64,
    pub backoff: BackoffPolicy,
    pub max_delay_ms: u64,
    pub rate_reset_window_ms: u64,

    // lockout
    pub max_failed_attempts: u32,
    pub lockout: LockoutPolicy,
    pub base_lockout_ms: u64,
    pub max_lockout_ms: u64,
    /// Absolute failure count that flips an identity to a permanent lock.
    pub permanent_ceiling: Option<u32>,
    pub lockout_reset_window_ms: u64,

    // challenge
    pub attempts_before_challenge: u32,
    pub challenge_length: usize,
    pub challenge_alphabet: String,
    pub challenge_validity_ms: u64,
    pub challenge_reset_window_ms: u64,
    /// Whether a correctly answered challenge also clears the lockout
    /// failure counter for the account.
    pub challenge_pass_resets_failures: bool,

    // anomaly detection
    pub failed_attempts_per_address: usize,
    pub distinct_accounts_per_address: usize,
    pub distinct_addresses_per_account: usize,
    pub anomaly_window_ms: u64,
    pub alarm_cooldown_ms: u64,

    // reaper
    pub eviction_ttl_ms: u64,
    pub reaper_interval_ms: u64,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            backoff: BackoffPolicy::Exponential { multiplier: 1.5 },
            max_delay_ms: 30_000,
            rate_reset_window_ms: 300_000,

            max_failed_attempts: 5,
            lockout: LockoutPolicy::Progressive { multiplier: 2.0 },
            base_lockout_ms: 300_000,
            max_lockout_ms: 3_600_000,
            permanent_ceiling: None,
            lockout_reset_window_ms: 900_000,

            attempts_before_challenge: 3,
            challenge_length: 6,
            challenge_alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
            challenge_validity_ms: 300_000,
            challenge_reset_window_ms: 900_000,
            challenge_pass_resets_failures: false,

            failed_attempts_per_address: 10,
            distinct_accounts_per_address: 5,
            distinct_addresses_per_account: 3,
            anomaly_window_ms: 300_000,
            alarm_cooldown_ms: 300_000,

            eviction_ttl_ms: 3_600_000,
            reaper_interval_ms: 60_000,
        }
    }
}

impl DefenseConfig {
    /// Load a config from a JSON file, falling back to defaults for any
    /// field the file does not name.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// The set of defenses active for this deployment. Any subset, including
/// the empty one, is valid; inactive components are skipped entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefenseSet {
    pub rate_limit: bool,
    pub lockout: bool,
    pub captcha: bool,
    pub anomaly: bool,
}

impl DefenseSet {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            rate_limit: true,
            lockout: true,
            captcha: true,
            anomaly: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            rate_limit: false,
            lockout: false,
            captcha: false,
            anomaly: false,
        }
    }
}

impl FromStr for DefenseSet {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => return Ok(Self::all()),
            "none" | "" => return Ok(Self::none()),
            _ => {}
        }

        let mut set = Self::none();
        for part in s.split(',') {
            match part.trim().to_lowercase().as_str() {
                "rate-limit" | "rate_limit" => set.rate_limit = true,
                "lockout" => set.lockout = true,
                "captcha" | "challenge" => set.captcha = true,
                "anomaly" => set.anomaly = true,
                other => return Err(format!("unknown defense: {other}")),
            }
        }
        Ok(set)
    }
}
