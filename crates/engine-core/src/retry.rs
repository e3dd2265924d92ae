use std::time::Duration;

/// Bounded exponential backoff for transient chunk-write failures.
///
/// The default policy makes a single attempt: write failures stay fatal
/// unless a step explicitly opts into retries. The loop driving the
/// attempts lives with the caller so it can log and count them; the
/// policy only answers how many attempts and how long to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Exponential backoff for the given zero-based attempt, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_the_cap() {
        let policy = RetryPolicy::new(
            5,
            Duration::from_millis(100),
            Duration::from_millis(350),
        );
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(350));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(350));
    }

    #[test]
    fn zero_base_delay_never_sleeps() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(4), Duration::ZERO);
    }

    #[test]
    fn attempts_clamp_to_at_least_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10), Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }
}
