//! Retry and backoff helpers shared by the page fetcher and LLM backends.

use std::time::Duration;

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Bounded exponential retry schedule.
///
/// `max_attempts` counts the first try, so a policy with three attempts
/// sleeps at most twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub multiplier: u32,
    pub cap: Duration,
}

impl RetryPolicy {
    /// Page fetching: 3 attempts, 2s, 4s, capped at 10s.
    pub const FETCH: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base: Duration::from_secs(2),
        multiplier: 2,
        cap: Duration::from_secs(10),
    };

    /// LLM server/overload errors: 3 attempts, 3s then 9s.
    pub const LLM_SERVER: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base: Duration::from_secs(3),
        multiplier: 3,
        cap: Duration::from_secs(30),
    };

    /// Same attempt ceiling with no sleeping, for tests.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::ZERO,
            multiplier: 1,
            cap: Duration::ZERO,
        }
    }

    /// Delay after the `attempt`-th failure (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Whether another attempt is allowed after `attempts_made` tries.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some("600")), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_fetch_policy_schedule() {
        let p = RetryPolicy::FETCH;
        assert_eq!(p.delay_for(0), Duration::from_secs(2));
        assert_eq!(p.delay_for(1), Duration::from_secs(4));
        assert_eq!(p.delay_for(2), Duration::from_secs(8));
        assert_eq!(p.delay_for(3), Duration::from_secs(10));
        assert!(p.allows_retry(2));
        assert!(!p.allows_retry(3));
    }

    #[test]
    fn test_llm_server_policy_schedule() {
        let p = RetryPolicy::LLM_SERVER;
        assert_eq!(p.delay_for(0), Duration::from_secs(3));
        assert_eq!(p.delay_for(1), Duration::from_secs(9));
    }

    #[test]
    fn test_immediate_never_sleeps() {
        let p = RetryPolicy::immediate(3);
        assert_eq!(p.delay_for(5), Duration::ZERO);
    }
}
