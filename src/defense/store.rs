use dashmap::DashMap;

/// Sentinel for a permanent lock; `now < PERMANENT` always holds.
pub const PERMANENT: u64 = u64::MAX;

/// Per-identity defense counters. One record per identity key, created
/// lazily on first attempt. All timestamps are unix milliseconds; a zero
/// timestamp means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefenseState {
    /// Consecutive failures since the last reset or success.
    pub failed_attempts: u32,
    pub last_attempt_at: u64,
    /// Rate-limit gate; attempts are rejected while `now` is below this.
    pub next_allowed_at: u64,
    /// Lock gate; [`PERMANENT`] marks a permanent lock.
    pub lockout_until: u64,
    /// How many times this identity has been locked; drives progressive
    /// lock durations.
    pub lockout_count: u32,
    pub permanently_locked: bool,
    /// Failures counted toward triggering a challenge, tracked separately
    /// from `failed_attempts` so thresholds can disagree by design.
    pub challenge_attempts: u32,
    pub challenge_required: bool,
    pub challenge_value: String,
    pub challenge_issued_at: u64,
}

impl DefenseState {
    #[must_use]
    pub fn locked(&self, now: u64) -> bool {
        self.permanently_locked || now < self.lockout_until
    }
}

/// Identity key for address-scoped state (rate limiting).
#[must_use]
pub fn address_key(address: &str) -> String {
    format!("ip:{address}")
}

/// Identity key for account-scoped state (lockout).
#[must_use]
pub fn account_key(account: &str) -> String {
    format!("acct:{account}")
}

/// Identity key for the address+account composite (challenge).
#[must_use]
pub fn composite_key(address: &str, account: &str) -> String {
    format!("{address}|{account}")
}

/// Keyed store of [`DefenseState`] records.
///
/// Each record is updated under its map entry lock, so a check-then-mutate
/// sequence for one key is a single transaction and cannot interleave with
/// another transaction on the same key. Different keys only contend on the
/// map shard, never on a global lock.
#[derive(Debug, Default)]
pub struct AttemptStore {
    states: DashMap<String, DefenseState>,
}

impl AttemptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the state for `key` under the entry lock, creating
    /// the record on first access. `f` must not block or call out.
    pub fn update<T>(&self, key: &str, f: impl FnOnce(&mut DefenseState) -> T) -> T {
        let mut entry = self.states.entry(key.to_string()).or_default();
        f(entry.value_mut())
    }

    /// Like [`update`](Self::update) but never creates the record.
    pub fn update_existing<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut DefenseState) -> T,
    ) -> Option<T> {
        self.states.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    /// Read-only snapshot of a record, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<DefenseState> {
        self.states.get(key).map(|entry| entry.value().clone())
    }

    /// Drop every record `f` rejects. Iteration is weakly consistent and
    /// safe to run while other keys are inserted or removed.
    pub fn retain(&self, f: impl FnMut(&String, &mut DefenseState) -> bool) {
        self.states.retain(f);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_creates_lazily() {
        let store = AttemptStore::new();
        assert!(store.get("ip:10.0.0.1").is_none());

        let attempts = store.update("ip:10.0.0.1", |state| {
            state.failed_attempts += 1;
            state.failed_attempts
        });

        assert_eq!(attempts, 1);
        assert_eq!(store.get("ip:10.0.0.1").unwrap().failed_attempts, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_existing_does_not_create() {
        let store = AttemptStore::new();
        assert!(store.update_existing("acct:ghost", |_| ()).is_none());
        assert!(store.is_empty());

        store.update("acct:alice", |state| state.failed_attempts = 3);
        let cleared = store.update_existing("acct:alice", |state| {
            state.failed_attempts = 0;
            true
        });
        assert_eq!(cleared, Some(true));
        assert_eq!(store.get("acct:alice").unwrap().failed_attempts, 0);
    }

    #[test]
    fn test_get_returns_snapshot() {
        let store = AttemptStore::new();
        store.update("k", |state| state.failed_attempts = 2);

        let snapshot = store.get("k").unwrap();
        store.update("k", |state| state.failed_attempts = 9);

        // snapshot is detached from later writes
        assert_eq!(snapshot.failed_attempts, 2);
    }

    #[test]
    fn test_key_shapes_are_distinct() {
        assert_ne!(address_key("a"), account_key("a"));
        assert_ne!(account_key("a"), composite_key("a", "a"));
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_counts() {
        use std::sync::Arc;

        let store = Arc::new(AttemptStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    store.update("ip:1.2.3.4", |state| state.failed_attempts += 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("ip:1.2.3.4").unwrap().failed_attempts, 800);
    }
}
