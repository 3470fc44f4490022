use crate::defense::{config::DefenseConfig, store::DefenseState};
use rand::Rng;

/// Outcome of the challenge gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeDecision {
    /// No challenge pending. `solved` is true when this pass consumed a
    /// correct answer rather than finding no challenge required.
    Pass { solved: bool },
    Required { challenge: String },
    Rejected { new_challenge: String },
}

/// Issues and verifies a human-proof challenge once failures cross a
/// threshold. Keyed by the address+account composite.
#[derive(Debug, Clone)]
pub struct ChallengeGate {
    attempts_before_challenge: u32,
    length: usize,
    alphabet: Vec<char>,
    validity_ms: u64,
    reset_window_ms: u64,
}

impl ChallengeGate {
    #[must_use]
    pub fn new(cfg: &DefenseConfig) -> Self {
        Self {
            attempts_before_challenge: cfg.attempts_before_challenge,
            length: cfg.challenge_length,
            alphabet: cfg.challenge_alphabet.chars().collect(),
            validity_ms: cfg.challenge_validity_ms,
            reset_window_ms: cfg.challenge_reset_window_ms,
        }
    }

    /// Gate check. A pending challenge must be answered before the
    /// attempt may proceed; a wrong answer burns the value and issues a
    /// fresh one, so no value is ever retried.
    pub fn evaluate(
        &self,
        state: &mut DefenseState,
        answer: Option<&str>,
        now: u64,
    ) -> ChallengeDecision {
        self.apply_reset(state, now);

        if state.challenge_attempts < self.attempts_before_challenge {
            return ChallengeDecision::Pass { solved: false };
        }

        state.challenge_required = true;
        self.ensure_fresh(state, now);

        let Some(answer) = answer else {
            return ChallengeDecision::Required {
                challenge: state.challenge_value.clone(),
            };
        };

        if answer.to_uppercase() == state.challenge_value.to_uppercase() {
            state.challenge_value.clear();
            state.challenge_required = false;
            state.challenge_attempts = 0;
            return ChallengeDecision::Pass { solved: true };
        }

        self.issue(state, now);
        ChallengeDecision::Rejected {
            new_challenge: state.challenge_value.clone(),
        }
    }

    pub fn on_success(&self, state: &mut DefenseState, now: u64) {
        state.challenge_attempts = 0;
        state.challenge_required = false;
        state.challenge_value.clear();
        state.last_attempt_at = now;
    }

    /// Count a failed credential check. Once the threshold is crossed a
    /// fresh challenge is issued and returned for the rejection response.
    pub fn on_failure(&self, state: &mut DefenseState, now: u64) -> Option<String> {
        state.challenge_attempts += 1;
        state.last_attempt_at = now;

        if state.challenge_attempts >= self.attempts_before_challenge {
            state.challenge_required = true;
            self.issue(state, now);
            return Some(state.challenge_value.clone());
        }

        None
    }

    /// Re-issue the pending challenge, for the explicit regeneration
    /// endpoint. Returns `None` when no challenge is required.
    pub fn regenerate(&self, state: &mut DefenseState, now: u64) -> Option<String> {
        if !state.challenge_required {
            return None;
        }
        self.issue(state, now);
        Some(state.challenge_value.clone())
    }

    fn apply_reset(&self, state: &mut DefenseState, now: u64) {
        // saturating: the wall clock may step backwards between attempts
        if state.last_attempt_at > 0
            && now.saturating_sub(state.last_attempt_at) > self.reset_window_ms
        {
            state.challenge_attempts = 0;
            state.challenge_required = false;
            state.challenge_value.clear();
        }
    }

    /// Issue a new value when none is pending or the pending one expired.
    fn ensure_fresh(&self, state: &mut DefenseState, now: u64) {
        if state.challenge_value.is_empty()
            || now.saturating_sub(state.challenge_issued_at) > self.validity_ms
        {
            self.issue(state, now);
        }
    }

    fn issue(&self, state: &mut DefenseState, now: u64) {
        state.challenge_value = self.generate();
        state.challenge_issued_at = now;
    }

    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ChallengeGate {
        ChallengeGate::new(&DefenseConfig::default())
    }

    fn triggered_state(gate: &ChallengeGate, now: u64) -> DefenseState {
        let mut state = DefenseState::default();
        for _ in 0..3 {
            gate.on_failure(&mut state, now);
        }
        assert!(state.challenge_required);
        state
    }

    #[test]
    fn test_pass_below_threshold() {
        let gate = gate();
        let mut state = DefenseState::default();
        assert_eq!(
            gate.evaluate(&mut state, None, 0),
            ChallengeDecision::Pass { solved: false }
        );
    }

    #[test]
    fn test_generated_value_uses_alphabet_and_length() {
        let gate = gate();
        let value = gate.generate();
        assert_eq!(value.chars().count(), 6);
        assert!(value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_challenge_required_after_threshold() {
        let gate = gate();
        let mut state = triggered_state(&gate, 1_000);

        match gate.evaluate(&mut state, None, 1_000) {
            ChallengeDecision::Required { challenge } => {
                assert_eq!(challenge, state.challenge_value);
            }
            other => panic!("expected required, got {other:?}"),
        }
    }

    #[test]
    fn test_answer_is_case_insensitive() {
        let gate = gate();
        let mut state = triggered_state(&gate, 1_000);
        let answer = state.challenge_value.to_lowercase();

        assert_eq!(
            gate.evaluate(&mut state, Some(&answer), 1_000),
            ChallengeDecision::Pass { solved: true }
        );
        assert!(state.challenge_value.is_empty());
        assert!(!state.challenge_required);
        assert_eq!(state.challenge_attempts, 0);
    }

    #[test]
    fn test_wrong_answer_issues_fresh_value() {
        let gate = gate();
        let mut state = triggered_state(&gate, 1_000);
        let old = state.challenge_value.clone();

        match gate.evaluate(&mut state, Some("not it"), 1_000) {
            ChallengeDecision::Rejected { new_challenge } => {
                assert_ne!(new_challenge, "not it");
                assert_eq!(new_challenge, state.challenge_value);
                // the burned value is gone; even the right answer to it
                // now fails
                if old != state.challenge_value {
                    assert!(matches!(
                        gate.evaluate(&mut state, Some(&old), 1_000),
                        ChallengeDecision::Rejected { .. }
                    ));
                }
            }
            other => panic!("expected rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_expired_challenge_never_accepted() {
        let gate = gate();
        let mut state = triggered_state(&gate, 1_000);
        let stale = state.challenge_value.clone();

        // past validity but within the reset window
        let later = 1_000 + 300_001;
        state.last_attempt_at = later; // keep the counter from resetting

        let decision = gate.evaluate(&mut state, Some(&stale), later);
        // a fresh value was issued before checking; the stale answer can
        // only pass by colliding with the new value
        if state.challenge_value != stale {
            assert!(matches!(decision, ChallengeDecision::Rejected { .. }));
        }
        assert!(state.challenge_issued_at >= later);
    }

    #[test]
    fn test_inactivity_reset_clears_requirement() {
        let gate = gate();
        let mut state = triggered_state(&gate, 1_000);

        let later = 1_000 + 900_001;
        assert_eq!(
            gate.evaluate(&mut state, None, later),
            ChallengeDecision::Pass { solved: false }
        );
        assert!(!state.challenge_required);
        assert!(state.challenge_value.is_empty());
    }

    #[test]
    fn test_clock_step_backwards_keeps_requirement() {
        let gate = gate();
        let mut state = triggered_state(&gate, 10_000);

        // evaluated with a clock earlier than the last attempt
        assert!(matches!(
            gate.evaluate(&mut state, None, 5_000),
            ChallengeDecision::Required { .. }
        ));
        assert_eq!(state.challenge_attempts, 3);
        assert!(state.challenge_required);
    }

    #[test]
    fn test_regenerate_only_when_required() {
        let gate = gate();
        let mut state = DefenseState::default();
        assert!(gate.regenerate(&mut state, 0).is_none());

        let mut state = triggered_state(&gate, 1_000);
        let old = state.challenge_value.clone();
        let fresh = gate.regenerate(&mut state, 2_000).unwrap();
        assert_eq!(fresh, state.challenge_value);
        assert_eq!(state.challenge_issued_at, 2_000);
        let _ = old;
    }
}
