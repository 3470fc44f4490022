use crate::defense::{
    anomaly::{AlarmSink, AnomalyDetector},
    challenge::{ChallengeDecision, ChallengeGate},
    config::{DefenseConfig, DefenseSet},
    lockout::{LockDecision, LockEvent, LockoutManager},
    rate_limit::{RateDecision, RateLimiter},
    store::{account_key, address_key, composite_key, AttemptStore, DefenseState},
    CredentialVerifier,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DefenseError {
    #[error("account is required")]
    MissingAccount,
}

/// One authentication attempt as seen by the engine.
#[derive(Debug)]
pub struct Attempt<'a> {
    pub address: &'a str,
    pub account: &'a str,
    pub secret: &'a str,
    pub challenge_answer: Option<&'a str>,
}

/// Single outcome of an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    CredentialsAccepted,
    /// Credentials wrong; carries a challenge when this failure crossed
    /// the challenge threshold.
    CredentialsRejected { challenge: Option<String> },
    RateLimited { retry_after_secs: u64 },
    Locked { retry_after_secs: u64 },
    PermanentlyLocked,
    ChallengeRequired { challenge: String },
    ChallengeRejected { new_challenge: String },
}

/// Composes the configured defenses into one verdict pipeline per attempt
/// and routes the outcome back into every active component.
///
/// Gate order is fixed: lockout, rate limiter, challenge; the first
/// rejection wins. Components not in the active set are skipped. Each
/// component works on its own identity key: the rate limiter on the
/// address, the lockout manager on the account, the challenge gate on the
/// address+account composite.
pub struct Orchestrator {
    store: Arc<AttemptStore>,
    defenses: DefenseSet,
    rate_limiter: RateLimiter,
    lockout: LockoutManager,
    challenge: ChallengeGate,
    anomaly: Arc<AnomalyDetector>,
    sinks: Vec<Arc<dyn AlarmSink>>,
    challenge_pass_resets_failures: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        cfg: &DefenseConfig,
        defenses: DefenseSet,
        store: Arc<AttemptStore>,
        sinks: Vec<Arc<dyn AlarmSink>>,
    ) -> Self {
        Self {
            store,
            defenses,
            rate_limiter: RateLimiter::new(cfg),
            lockout: LockoutManager::new(cfg),
            challenge: ChallengeGate::new(cfg),
            anomaly: Arc::new(AnomalyDetector::new(cfg)),
            sinks,
            challenge_pass_resets_failures: cfg.challenge_pass_resets_failures,
        }
    }

    /// Run one attempt through the pipeline.
    ///
    /// # Errors
    /// Returns [`DefenseError::MissingAccount`] before touching any state
    /// when the account field is empty.
    pub fn handle_attempt(
        &self,
        attempt: &Attempt<'_>,
        verifier: &dyn CredentialVerifier,
        now: u64,
    ) -> Result<Verdict, DefenseError> {
        if attempt.account.trim().is_empty() {
            return Err(DefenseError::MissingAccount);
        }

        let ip_key = address_key(attempt.address);
        let acct_key = account_key(attempt.account);
        let comp_key = composite_key(attempt.address, attempt.account);

        if self.defenses.lockout {
            let decision = self
                .store
                .update(&acct_key, |state| self.lockout.evaluate(state, now));
            match decision {
                LockDecision::Allow => {}
                LockDecision::Locked { retry_after_secs } => {
                    return Ok(Verdict::Locked { retry_after_secs });
                }
                LockDecision::PermanentlyLocked => return Ok(Verdict::PermanentlyLocked),
            }
        }

        if self.defenses.rate_limit {
            let decision = self
                .store
                .update(&ip_key, |state| self.rate_limiter.evaluate(state, now));
            if let RateDecision::Reject { retry_after_secs } = decision {
                return Ok(Verdict::RateLimited { retry_after_secs });
            }
        }

        if self.defenses.captcha {
            let decision = self.store.update(&comp_key, |state| {
                self.challenge.evaluate(state, attempt.challenge_answer, now)
            });
            match decision {
                ChallengeDecision::Pass { solved } => {
                    if solved && self.challenge_pass_resets_failures {
                        // no account record means nothing to reset
                        let _ = self
                            .store
                            .update_existing(&acct_key, |state| state.failed_attempts = 0);
                    }
                }
                ChallengeDecision::Required { challenge } => {
                    return Ok(Verdict::ChallengeRequired { challenge });
                }
                ChallengeDecision::Rejected { new_challenge } => {
                    return Ok(Verdict::ChallengeRejected { new_challenge });
                }
            }
        }

        // all active gates passed; the external credential check runs once
        let success = verifier.check(attempt.account, attempt.secret);
        let verdict = if success {
            self.record_success(&ip_key, &acct_key, &comp_key, now);
            Verdict::CredentialsAccepted
        } else {
            self.record_failure(&ip_key, &acct_key, &comp_key, now)
        };

        // the detector observes last, after the counters settled
        if self.defenses.anomaly {
            if let Some(alarm) = self
                .anomaly
                .observe(attempt.address, attempt.account, success, now)
            {
                debug!(address = %alarm.address, "Emitting alarm");
                for sink in &self.sinks {
                    sink.notify(&alarm);
                }
            }
        }

        Ok(verdict)
    }

    fn record_success(&self, ip_key: &str, acct_key: &str, comp_key: &str, now: u64) {
        if self.defenses.rate_limit {
            self.store
                .update(ip_key, |state| self.rate_limiter.on_success(state, now));
        }
        if self.defenses.lockout {
            self.store
                .update(acct_key, |state| self.lockout.on_success(state, now));
        }
        if self.defenses.captcha {
            self.store
                .update(comp_key, |state| self.challenge.on_success(state, now));
        }
    }

    fn record_failure(&self, ip_key: &str, acct_key: &str, comp_key: &str, now: u64) -> Verdict {
        let mut verdict = Verdict::CredentialsRejected { challenge: None };

        if self.defenses.rate_limit {
            self.store
                .update(ip_key, |state| self.rate_limiter.on_failure(state, now));
        }

        if self.defenses.lockout {
            let event = self
                .store
                .update(acct_key, |state| self.lockout.on_failure(state, now));
            match event {
                Some(LockEvent::Locked { duration_secs }) => {
                    verdict = Verdict::Locked {
                        retry_after_secs: duration_secs,
                    };
                }
                Some(LockEvent::PermanentlyLocked) => verdict = Verdict::PermanentlyLocked,
                None => {}
            }
        }

        if self.defenses.captcha {
            let challenge = self
                .store
                .update(comp_key, |state| self.challenge.on_failure(state, now));
            if let Verdict::CredentialsRejected { .. } = verdict {
                verdict = Verdict::CredentialsRejected { challenge };
            }
        }

        verdict
    }

    /// Administrative unlock for an account. Returns false when the
    /// account has no record.
    pub fn unlock(&self, account: &str) -> bool {
        self.store
            .update_existing(&account_key(account), |state| self.lockout.unlock(state))
            .is_some()
    }

    /// Re-issue the pending challenge for an address+account pair, if one
    /// is required.
    pub fn regenerate_challenge(&self, address: &str, account: &str, now: u64) -> Option<String> {
        self.store
            .update_existing(&composite_key(address, account), |state| {
                self.challenge.regenerate(state, now)
            })
            .flatten()
    }

    /// Read-only projection of the rate-limit state for an address.
    #[must_use]
    pub fn rate_state(&self, address: &str) -> Option<DefenseState> {
        self.store.get(&address_key(address))
    }

    /// Read-only projection of the lockout state for an account.
    #[must_use]
    pub fn account_state(&self, account: &str) -> Option<DefenseState> {
        self.store.get(&account_key(account))
    }

    /// Read-only projection of the challenge state for a pair.
    #[must_use]
    pub fn challenge_state(&self, address: &str, account: &str) -> Option<DefenseState> {
        self.store.get(&composite_key(address, account))
    }

    #[must_use]
    pub fn store(&self) -> &AttemptStore {
        &self.store
    }

    #[must_use]
    pub fn anomaly(&self) -> Arc<AnomalyDetector> {
        Arc::clone(&self.anomaly)
    }
}
