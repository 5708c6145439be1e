//! Client-side model of the application's login block

use std::time::Duration;
use tokio::time::Instant;
use uiprobe_common::LockoutPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { remaining: Duration },
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }
}

/// Failure bookkeeping for one account.
///
/// Mirrors the server: a refused attempt while locked is not counted, a
/// failure after the block expired re-arms it immediately, and a successful
/// sign-in clears the counter.
#[derive(Debug, Clone)]
pub struct LockoutTracker {
    policy: LockoutPolicy,
    failures: u32,
    last_failure: Option<Instant>,
}

impl LockoutTracker {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            last_failure: None,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn state(&self) -> LockState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> LockState {
        match self.last_failure {
            Some(at) if self.failures >= self.policy.attempts => {
                let elapsed = now.saturating_duration_since(at);
                if elapsed < self.policy.block() {
                    LockState::Locked {
                        remaining: self.policy.block() - elapsed,
                    }
                } else {
                    LockState::Unlocked
                }
            }
            _ => LockState::Unlocked,
        }
    }

    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&mut self, now: Instant) {
        if self.state_at(now).is_locked() {
            return;
        }
        self.failures += 1;
        self.last_failure = Some(now);
    }

    /// Clear the counter, returning how many failures had been logged.
    pub fn record_success(&mut self) -> u32 {
        let logged = self.failures;
        self.failures = 0;
        self.last_failure = None;
        logged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> LockoutTracker {
        LockoutTracker::new(LockoutPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_locks_after_policy_attempts() {
        let mut t = tracker();
        let now = Instant::now();
        for _ in 0..4 {
            t.record_failure_at(now);
        }
        assert_eq!(t.state_at(now), LockState::Unlocked);

        t.record_failure_at(now);
        assert_eq!(
            t.state_at(now),
            LockState::Locked {
                remaining: Duration::from_secs(30)
            }
        );
        assert_eq!(t.failures(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_attempt_not_counted() {
        let mut t = tracker();
        let now = Instant::now();
        for _ in 0..5 {
            t.record_failure_at(now);
        }
        t.record_failure_at(now + Duration::from_secs(10));
        assert_eq!(t.failures(), 5);
        assert_eq!(
            t.state_at(now + Duration::from_secs(10)),
            LockState::Locked {
                remaining: Duration::from_secs(20)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlocks_after_block_and_rearms() {
        let mut t = tracker();
        let now = Instant::now();
        for _ in 0..5 {
            t.record_failure_at(now);
        }
        let later = now + Duration::from_secs(30);
        assert_eq!(t.state_at(later), LockState::Unlocked);

        t.record_failure_at(later);
        assert_eq!(t.failures(), 6);
        assert!(t.state_at(later).is_locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let mut t = tracker();
        t.record_failure();
        t.record_failure();
        assert_eq!(t.record_success(), 2);
        assert_eq!(t.failures(), 0);
        assert_eq!(t.state(), LockState::Unlocked);
    }
}
