use crate::defense::{
    config::{BackoffPolicy, DefenseConfig},
    remaining_secs,
    store::DefenseState,
};

/// Outcome of the rate-limit gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Reject { retry_after_secs: u64 },
}

/// Computes a backoff delay per failure and gates attempts while the
/// cool-down is active. Keyed by client address.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    base_delay_ms: u64,
    backoff: BackoffPolicy,
    max_delay_ms: u64,
    reset_window_ms: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(cfg: &DefenseConfig) -> Self {
        Self {
            base_delay_ms: cfg.base_delay_ms,
            backoff: cfg.backoff,
            max_delay_ms: cfg.max_delay_ms,
            reset_window_ms: cfg.rate_reset_window_ms,
        }
    }

    /// Gate check. Applies the inactivity reset first, then rejects while
    /// the cool-down holds, reporting whole seconds remaining.
    pub fn evaluate(&self, state: &mut DefenseState, now: u64) -> RateDecision {
        self.apply_reset(state, now);

        if now < state.next_allowed_at {
            return RateDecision::Reject {
                retry_after_secs: remaining_secs(state.next_allowed_at, now),
            };
        }

        RateDecision::Allow
    }

    pub fn on_success(&self, state: &mut DefenseState, now: u64) {
        state.failed_attempts = 0;
        state.next_allowed_at = 0;
        state.last_attempt_at = now;
    }

    /// Record a failure and arm the gate. Returns the delay applied, ms.
    pub fn on_failure(&self, state: &mut DefenseState, now: u64) -> u64 {
        state.failed_attempts += 1;
        state.last_attempt_at = now;

        let delay = self.delay_for(state.failed_attempts);
        state.next_allowed_at = now + delay;
        delay
    }

    fn apply_reset(&self, state: &mut DefenseState, now: u64) {
        // saturating: the wall clock may step backwards between attempts
        if state.last_attempt_at > 0
            && now.saturating_sub(state.last_attempt_at) > self.reset_window_ms
        {
            state.failed_attempts = 0;
            state.next_allowed_at = 0;
        }
    }

    fn delay_for(&self, failed_attempts: u32) -> u64 {
        let raw = match self.backoff {
            BackoffPolicy::Linear => self
                .base_delay_ms
                .saturating_mul(u64::from(failed_attempts)),
            BackoffPolicy::Exponential { multiplier } => {
                let delay = self.base_delay_ms as f64
                    * multiplier.powi(i32::try_from(failed_attempts).unwrap_or(i32::MAX));
                if delay.is_finite() {
                    delay as u64
                } else {
                    u64::MAX
                }
            }
        };
        raw.min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> RateLimiter {
        RateLimiter::new(&DefenseConfig {
            base_delay_ms: 1_500,
            backoff: BackoffPolicy::Linear,
            max_delay_ms: 30_000,
            rate_reset_window_ms: 300_000,
            ..DefenseConfig::default()
        })
    }

    fn exponential() -> RateLimiter {
        RateLimiter::new(&DefenseConfig::default())
    }

    #[test]
    fn test_first_attempt_allowed() {
        let limiter = linear();
        let mut state = DefenseState::default();
        assert_eq!(limiter.evaluate(&mut state, 1_000), RateDecision::Allow);
    }

    #[test]
    fn test_linear_backoff_grows_per_failure() {
        let limiter = linear();
        let mut state = DefenseState::default();

        assert_eq!(limiter.on_failure(&mut state, 0), 1_500);
        assert_eq!(limiter.on_failure(&mut state, 0), 3_000);
        assert_eq!(limiter.on_failure(&mut state, 0), 4_500);
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let limiter = exponential();
        let mut state = DefenseState::default();

        // 1000 * 1.5^n, capped at 30s
        let mut last = 0;
        for _ in 0..20 {
            let delay = limiter.on_failure(&mut state, 0);
            assert!(delay >= last, "backoff must be non-decreasing");
            assert!(delay <= 30_000);
            last = delay;
        }
        assert_eq!(last, 30_000);
    }

    #[test]
    fn test_gate_rejects_with_ceiling_seconds() {
        let limiter = linear();
        let mut state = DefenseState::default();
        limiter.on_failure(&mut state, 10_000); // next allowed at 11_500

        match limiter.evaluate(&mut state, 10_100) {
            RateDecision::Reject { retry_after_secs } => assert_eq!(retry_after_secs, 2),
            RateDecision::Allow => panic!("expected reject"),
        }

        assert_eq!(limiter.evaluate(&mut state, 11_500), RateDecision::Allow);
    }

    #[test]
    fn test_reset_after_inactivity_behaves_like_first_failure() {
        let limiter = linear();
        let mut state = DefenseState::default();

        for _ in 0..4 {
            limiter.on_failure(&mut state, 1_000);
        }

        // beyond the reset window the next failure is a first failure again
        let later = 1_000 + 300_001;
        assert_eq!(limiter.evaluate(&mut state, later), RateDecision::Allow);
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(limiter.on_failure(&mut state, later), 1_500);
    }

    #[test]
    fn test_clock_step_backwards_keeps_state() {
        let limiter = linear();
        let mut state = DefenseState::default();
        limiter.on_failure(&mut state, 10_000); // next allowed at 11_500

        // evaluated with a clock earlier than the last attempt
        assert!(matches!(
            limiter.evaluate(&mut state, 5_000),
            RateDecision::Reject { .. }
        ));
        assert_eq!(state.failed_attempts, 1);
    }

    #[test]
    fn test_success_clears_gate() {
        let limiter = linear();
        let mut state = DefenseState::default();
        limiter.on_failure(&mut state, 1_000);

        limiter.on_success(&mut state, 2_000);
        assert_eq!(state.failed_attempts, 0);
        assert_eq!(state.next_allowed_at, 0);
        assert_eq!(state.last_attempt_at, 2_000);
        assert_eq!(limiter.evaluate(&mut state, 2_000), RateDecision::Allow);
    }
}
