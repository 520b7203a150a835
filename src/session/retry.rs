//! Retry budgets and backoff schedules for gateway connections.
//!
//! Two faults are retried locally and invisibly to the caller:
//!
//! - **connection refused**: bounded attempts with a growing backoff,
//!   parameterized per operation (a one-shot connectivity test must
//!   terminate quickly; a persistent session gets a larger budget).
//! - **connection reset** on a persistent session: fixed 60 s pause,
//!   retried indefinitely and not counted against the refused budget.

use std::time::Duration;

/// Pause applied after a connection reset on a persistent session.
pub const RESET_PAUSE: Duration = Duration::from_secs(60);

/// Backoff shape between refused attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backoff {
    /// 1 s, 2 s, 4 s, ... doubling per attempt.
    Doubling,
    /// 1 s, then 2 s x completed attempts: 2 s, 4 s, 6 s, ...
    LinearByAttempt,
}

/// Bounded attempt count plus backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up.
    pub max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// One-shot connectivity test: 3 attempts, doubling from 1 s.
    pub const TEST: Self = Self {
        max_attempts: 3,
        backoff: Backoff::Doubling,
    };

    /// Persistent event/command session: 5 attempts, linear growth from 1 s.
    pub const PERSISTENT: Self = Self {
        max_attempts: 5,
        backoff: Backoff::LinearByAttempt,
    };

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    ///
    /// No delay is taken after the final attempt; the budget is already
    /// exhausted at that point.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = match self.backoff {
            Backoff::Doubling => 1u64 << (attempt - 1).min(16),
            Backoff::LinearByAttempt => {
                if attempt <= 1 {
                    1
                } else {
                    u64::from(attempt - 1) * 2
                }
            }
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_policy_schedule() {
        let policy = RetryPolicy::TEST;
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_persistent_policy_schedule() {
        let policy = RetryPolicy::PERSISTENT;
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(6));
        assert_eq!(policy.delay(5), Duration::from_secs(8));
    }

    #[test]
    fn test_doubling_delay_is_capped() {
        // The shift is clamped so a pathological attempt count cannot
        // overflow the exponent.
        let policy = RetryPolicy::TEST;
        assert_eq!(policy.delay(40), Duration::from_secs(1 << 16));
    }
}
