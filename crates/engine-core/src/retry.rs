use std::time::Duration;

/// Retry budget for the engines' database calls.
///
/// The full-load and apply engines drive their own retry loops, because
/// each attempt needs side work the loop owns: reconnecting a dead
/// target connection, dropping and recreating the target table, or
/// clearing the progress ledger. The policy therefore only answers two
/// questions: does the budget allow another attempt, and how long to
/// pause before it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Budget for whole full-load attempts; the count comes from
    /// `FULLLOAD_MAX_RETRIES`. Pauses start at a second because a failed
    /// attempt usually means the source or target needs time to recover.
    pub fn for_full_load(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::from_secs(1), Duration::from_secs(30))
    }

    /// Budget for a single apply statement or binlog reconnect. Short
    /// first pause: the common cause is a dropped connection, and the
    /// pool hands out a fresh one immediately.
    pub fn for_apply() -> Self {
        Self::new(5, Duration::from_millis(250), Duration::from_secs(5))
    }

    /// Whether a failure on the zero-based `attempt` leaves budget for
    /// another try.
    pub fn allows_another(&self, attempt: usize) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Pause before re-running after the zero-based `attempt` failed.
    /// Doubles per failure from the base and saturates at the cap, so a
    /// flapping source settles into steady max-delay probing instead of
    /// hammering the server.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let doublings = u32::try_from(attempt).unwrap_or(u32::MAX).min(16);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(doublings));
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_backoff_doubles_then_settles_at_the_cap() {
        let policy = RetryPolicy::for_apply();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(250));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(10), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(1000), Duration::from_secs(5));
    }

    #[test]
    fn apply_budget_allows_four_reconnects() {
        let policy = RetryPolicy::for_apply();
        assert!(policy.allows_another(0));
        assert!(policy.allows_another(3));
        assert!(!policy.allows_another(4));
    }

    #[test]
    fn full_load_budget_follows_the_configured_attempts() {
        let policy = RetryPolicy::for_full_load(3);
        assert!(policy.allows_another(1));
        assert!(!policy.allows_another(2));

        // a zero from configuration still permits the initial attempt
        let minimal = RetryPolicy::for_full_load(0);
        assert!(!minimal.allows_another(0));
        assert_eq!(minimal.backoff_delay(0), Duration::from_secs(1));
    }

    #[test]
    fn cap_never_undercuts_the_base_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_millis(1));
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(2));
    }

    #[test]
    fn zero_base_delay_stays_zero() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.backoff_delay(4), Duration::ZERO);
    }
}
