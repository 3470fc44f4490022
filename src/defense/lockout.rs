use crate::defense::{
    config::{DefenseConfig, LockoutPolicy},
    remaining_secs,
    store::{DefenseState, PERMANENT},
};

/// Outcome of the lockout gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDecision {
    Allow,
    Locked { retry_after_secs: u64 },
    PermanentlyLocked,
}

/// Lock transition caused by a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Locked { duration_secs: u64 },
    PermanentlyLocked,
}

/// Enforces temporary and permanent account locks after threshold
/// failures. "Locked" is a predicate over `lockout_until`, not a scheduled
/// event; the transition back to unlocked happens lazily on evaluation.
#[derive(Debug, Clone)]
pub struct LockoutManager {
    max_failed_attempts: u32,
    policy: LockoutPolicy,
    base_lockout_ms: u64,
    max_lockout_ms: u64,
    permanent_ceiling: Option<u32>,
    reset_window_ms: u64,
}

impl LockoutManager {
    #[must_use]
    pub fn new(cfg: &DefenseConfig) -> Self {
        Self {
            max_failed_attempts: cfg.max_failed_attempts,
            policy: cfg.lockout,
            base_lockout_ms: cfg.base_lockout_ms,
            max_lockout_ms: cfg.max_lockout_ms,
            permanent_ceiling: cfg.permanent_ceiling,
            reset_window_ms: cfg.lockout_reset_window_ms,
        }
    }

    /// Gate check, evaluated before all other gates. A locked identity
    /// never reaches the rate limiter or the challenge gate.
    pub fn evaluate(&self, state: &mut DefenseState, now: u64) -> LockDecision {
        if state.permanently_locked {
            return LockDecision::PermanentlyLocked;
        }

        if now < state.lockout_until {
            return LockDecision::Locked {
                retry_after_secs: remaining_secs(state.lockout_until, now),
            };
        }

        // saturating: the wall clock may step backwards between attempts
        if state.last_attempt_at > 0
            && now.saturating_sub(state.last_attempt_at) > self.reset_window_ms
        {
            state.failed_attempts = 0;
            state.lockout_count = 0;
        }

        LockDecision::Allow
    }

    pub fn on_success(&self, state: &mut DefenseState, now: u64) {
        state.failed_attempts = 0;
        state.lockout_count = 0;
        state.lockout_until = 0;
        state.last_attempt_at = now;
    }

    /// Record a failure; returns the lock transition it caused, if any.
    pub fn on_failure(&self, state: &mut DefenseState, now: u64) -> Option<LockEvent> {
        state.failed_attempts += 1;
        state.last_attempt_at = now;

        if let Some(ceiling) = self.permanent_ceiling {
            if state.failed_attempts >= ceiling {
                state.permanently_locked = true;
                state.lockout_until = PERMANENT;
                return Some(LockEvent::PermanentlyLocked);
            }
        }

        if state.failed_attempts >= self.max_failed_attempts {
            state.lockout_count += 1;
            let duration = self.lock_duration(state.lockout_count);
            state.lockout_until = now + duration;
            return Some(LockEvent::Locked {
                duration_secs: duration.div_ceil(1000),
            });
        }

        None
    }

    /// Administrative unlock: clears every lock field, including a
    /// permanent lock. The only way out of `permanently_locked`.
    pub fn unlock(&self, state: &mut DefenseState) {
        state.failed_attempts = 0;
        state.lockout_count = 0;
        state.lockout_until = 0;
        state.permanently_locked = false;
    }

    fn lock_duration(&self, lockout_count: u32) -> u64 {
        match self.policy {
            LockoutPolicy::Fixed => self.base_lockout_ms,
            LockoutPolicy::Progressive { multiplier } => {
                let exp = i32::try_from(lockout_count.saturating_sub(1)).unwrap_or(i32::MAX);
                let duration = self.base_lockout_ms as f64 * multiplier.powi(exp);
                if duration.is_finite() {
                    (duration as u64).min(self.max_lockout_ms)
                } else {
                    self.max_lockout_ms
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> LockoutManager {
        LockoutManager::new(&DefenseConfig::default())
    }

    fn lock_once(manager: &LockoutManager, state: &mut DefenseState, now: u64) -> LockEvent {
        loop {
            if let Some(event) = manager.on_failure(state, now) {
                return event;
            }
        }
    }

    #[test]
    fn test_locks_at_threshold() {
        let manager = manager();
        let mut state = DefenseState::default();

        for _ in 0..4 {
            assert_eq!(manager.on_failure(&mut state, 1_000), None);
        }
        assert_eq!(
            manager.on_failure(&mut state, 1_000),
            Some(LockEvent::Locked { duration_secs: 300 })
        );
        assert_eq!(state.lockout_count, 1);
        assert_eq!(state.lockout_until, 1_000 + 300_000);
    }

    #[test]
    fn test_progressive_durations_double_up_to_cap() {
        let manager = manager();
        let mut state = DefenseState::default();

        let mut durations = Vec::new();
        for _ in 0..6 {
            state.failed_attempts = 0;
            match lock_once(&manager, &mut state, 0) {
                LockEvent::Locked { duration_secs } => durations.push(duration_secs),
                LockEvent::PermanentlyLocked => panic!("no permanent ceiling configured"),
            }
        }

        assert_eq!(durations, vec![300, 600, 1_200, 2_400, 3_600, 3_600]);
    }

    #[test]
    fn test_fixed_policy_ignores_lockout_count() {
        let manager = LockoutManager::new(&DefenseConfig {
            lockout: LockoutPolicy::Fixed,
            ..DefenseConfig::default()
        });
        let mut state = DefenseState {
            lockout_count: 7,
            failed_attempts: 4,
            ..DefenseState::default()
        };

        assert_eq!(
            manager.on_failure(&mut state, 0),
            Some(LockEvent::Locked { duration_secs: 300 })
        );
    }

    #[test]
    fn test_locked_gate_reports_remaining_and_expires() {
        let manager = manager();
        let mut state = DefenseState::default();
        state.failed_attempts = 4;
        manager.on_failure(&mut state, 10_000);

        match manager.evaluate(&mut state, 40_000) {
            LockDecision::Locked { retry_after_secs } => assert_eq!(retry_after_secs, 270),
            other => panic!("expected locked, got {other:?}"),
        }

        // lock expires lazily
        assert_eq!(
            manager.evaluate(&mut state, 10_000 + 300_000),
            LockDecision::Allow
        );
    }

    #[test]
    fn test_permanent_ceiling_is_terminal() {
        let manager = LockoutManager::new(&DefenseConfig {
            max_failed_attempts: 3,
            permanent_ceiling: Some(5),
            ..DefenseConfig::default()
        });
        let mut state = DefenseState::default();

        for _ in 0..2 {
            manager.on_failure(&mut state, 0);
        }
        assert!(matches!(
            manager.on_failure(&mut state, 0),
            Some(LockEvent::Locked { .. })
        ));
        manager.on_failure(&mut state, 0);
        assert_eq!(
            manager.on_failure(&mut state, 0),
            Some(LockEvent::PermanentlyLocked)
        );
        assert!(state.permanently_locked);

        // no expiry, ever
        assert_eq!(
            manager.evaluate(&mut state, u64::MAX - 1),
            LockDecision::PermanentlyLocked
        );
    }

    #[test]
    fn test_unlock_clears_permanent_lock() {
        let manager = LockoutManager::new(&DefenseConfig {
            max_failed_attempts: 1,
            permanent_ceiling: Some(1),
            ..DefenseConfig::default()
        });
        let mut state = DefenseState::default();
        manager.on_failure(&mut state, 0);
        assert!(state.permanently_locked);

        manager.unlock(&mut state);
        assert!(!state.permanently_locked);
        assert_eq!(state.lockout_until, 0);
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(state.lockout_count, 0);
        assert_eq!(manager.evaluate(&mut state, 1), LockDecision::Allow);
    }

    #[test]
    fn test_clock_step_backwards_keeps_counters() {
        let manager = manager();
        let mut state = DefenseState::default();
        for _ in 0..3 {
            manager.on_failure(&mut state, 10_000);
        }

        // evaluated with a clock earlier than the last attempt
        assert_eq!(manager.evaluate(&mut state, 5_000), LockDecision::Allow);
        assert_eq!(state.failed_attempts, 3);
    }

    #[test]
    fn test_inactivity_reset_clears_counters() {
        let manager = manager();
        let mut state = DefenseState::default();
        for _ in 0..3 {
            manager.on_failure(&mut state, 1_000);
        }
        state.lockout_count = 2;

        let later = 1_000 + 900_001;
        assert_eq!(manager.evaluate(&mut state, later), LockDecision::Allow);
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(state.lockout_count, 0);
    }
}
