//! Wait strategies for polling loops and transient-failure retries.
//!
//! A [`RetryPolicy`] describes how long to sleep between attempts and when to
//! give up. A [`Deadline`] caps every policy to the time left in the
//! invocation, so a loop gives up while there is still time to report it.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
    max_attempts: Option<u32>,
    max_total_wait: Option<Duration>,
}

impl RetryPolicy {
    /// Constant interval, no limits.
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            initial_delay: interval,
            multiplier: 1,
            max_delay: interval,
            max_attempts: None,
            max_total_wait: None,
        }
    }

    /// Doubling delays capped at `max_delay`, no limits.
    pub const fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            multiplier: 2,
            max_delay,
            max_attempts: None,
            max_total_wait: None,
        }
    }

    /// Total number of attempts, including the first one.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub const fn with_max_total_wait(mut self, max_total_wait: Duration) -> Self {
        self.max_total_wait = Some(max_total_wait);
        self
    }

    pub const fn without_limits(mut self) -> Self {
        self.max_attempts = None;
        self.max_total_wait = None;
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn max_total_wait(&self) -> Option<Duration> {
        self.max_total_wait
    }

    /// Lowers the total wait to `budget` when it is unset or larger.
    pub fn capped_at(mut self, budget: Duration) -> Self {
        self.max_total_wait = Some(match self.max_total_wait {
            Some(current) => current.min(budget),
            None => budget,
        });
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.max_total_wait.is_some()
    }

    pub fn delays(&self) -> Backoff {
        Backoff {
            policy: *self,
            next_delay: self.initial_delay.min(self.max_delay),
            delays_taken: 0,
            waited: Duration::ZERO,
        }
    }
}

/// Wall-clock end of the invocation minus a reserve kept for the final
/// callback and cleanup calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Option<Instant>,
    reserve: Duration,
}

impl Deadline {
    pub const fn unlimited() -> Self {
        Self {
            expires_at: None,
            reserve: Duration::ZERO,
        }
    }

    pub fn after(remaining: Duration, reserve: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + remaining),
            reserve,
        }
    }

    /// Time still available for waiting, `None` when there is no deadline.
    pub fn wait_budget(&self) -> Option<Duration> {
        self.expires_at.map(|expires_at| {
            expires_at
                .saturating_duration_since(Instant::now())
                .saturating_sub(self.reserve)
        })
    }

    /// `policy` with its total wait limited to what is left right now.
    pub fn cap(&self, policy: &RetryPolicy) -> RetryPolicy {
        match self.wait_budget() {
            Some(budget) => policy.capped_at(budget),
            None => *policy,
        }
    }
}

/// Iterator over the sleeps between attempts. Yields `None` once the policy
/// allows no further attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    next_delay: Duration,
    delays_taken: u32,
    waited: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.policy.max_attempts {
            if self.delays_taken.saturating_add(1) >= max_attempts {
                return None;
            }
        }

        let mut delay = self.next_delay;
        if let Some(max_total_wait) = self.policy.max_total_wait {
            let remaining = max_total_wait.saturating_sub(self.waited);
            if remaining.is_zero() {
                return None;
            }
            delay = delay.min(remaining);
        }

        self.delays_taken = self.delays_taken.saturating_add(1);
        self.waited = self.waited.saturating_add(delay);
        self.next_delay = self
            .next_delay
            .saturating_mul(self.policy.multiplier)
            .min(self.policy.max_delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn exponential_delays_are_capped() {
        let delays: Vec<_> = RetryPolicy::exponential(secs(10), secs(60))
            .with_max_attempts(7)
            .delays()
            .collect();

        assert_eq!(
            delays,
            vec![secs(10), secs(20), secs(40), secs(60), secs(60), secs(60)]
        );
    }

    #[test]
    fn max_attempts_counts_the_first_attempt() {
        assert_eq!(
            RetryPolicy::fixed(secs(1)).with_max_attempts(1).delays().count(),
            0
        );
        assert_eq!(
            RetryPolicy::fixed(secs(1)).with_max_attempts(4).delays().count(),
            3
        );
    }

    #[test]
    fn total_wait_clamps_the_last_delay() {
        let mut backoff = RetryPolicy::fixed(secs(10))
            .with_max_total_wait(secs(25))
            .delays();

        assert_eq!(backoff.next(), Some(secs(10)));
        assert_eq!(backoff.next(), Some(secs(10)));
        assert_eq!(backoff.next(), Some(secs(5)));
        assert_eq!(backoff.next(), None);
    }

    #[test]
    fn unbounded_policy_keeps_yielding() {
        let policy = RetryPolicy::fixed(secs(60));

        assert!(!policy.is_bounded());
        assert_eq!(policy.delays().take(10_000).count(), 10_000);
    }

    #[test]
    fn capping_only_lowers_the_total_wait() {
        let policy = RetryPolicy::fixed(secs(10)).with_max_total_wait(secs(60));

        assert_eq!(policy.capped_at(secs(30)).max_total_wait(), Some(secs(30)));
        assert_eq!(policy.capped_at(secs(90)).max_total_wait(), Some(secs(60)));
        assert_eq!(
            RetryPolicy::fixed(secs(10)).capped_at(secs(45)).max_total_wait(),
            Some(secs(45))
        );
    }

    #[test]
    fn deadline_keeps_the_reserve_out_of_the_budget() {
        let deadline = Deadline::after(secs(120), secs(30));
        let budget = deadline.wait_budget().expect("deadline is set");

        assert!(budget <= secs(90));
        assert!(budget > secs(80));

        let capped = deadline.cap(&RetryPolicy::fixed(secs(10)));
        let total: Duration = capped.delays().sum();
        assert!(total <= secs(90));
    }

    #[test]
    fn expired_deadline_allows_no_sleep() {
        let deadline = Deadline::after(secs(5), secs(30));

        assert_eq!(deadline.wait_budget(), Some(Duration::ZERO));
        assert_eq!(deadline.cap(&RetryPolicy::fixed(secs(10))).delays().count(), 0);
    }

    #[test]
    fn unlimited_deadline_leaves_policy_untouched() {
        let policy = RetryPolicy::exponential(secs(1), secs(8)).with_max_attempts(3);

        assert_eq!(Deadline::unlimited().cap(&policy), policy);
        assert_eq!(Deadline::unlimited().wait_budget(), None);
    }

    #[test]
    fn without_limits_drops_both_bounds() {
        let policy = RetryPolicy::exponential(secs(1), secs(8))
            .with_max_attempts(2)
            .with_max_total_wait(secs(3))
            .without_limits();

        assert!(policy.max_attempts().is_none());
        assert!(policy.max_total_wait().is_none());
    }
}
