//! Retry policy for transient failures
//!
//! A pure decision function: given an error class and the attempt number,
//! either retry after an exponentially growing (capped) delay or stop.
//! Auth and client errors are never retried here; they have dedicated
//! recovery paths in the pipeline.

use std::time::Duration;

use crate::errors::ErrorClass;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the given delay, then re-send.
    Retry(Duration),
    /// Surface the failure to the caller.
    Stop,
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
}

impl RetryPolicy {
    /// Create a policy with the given backoff bounds.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self { base_delay, max_delay, max_retries }
    }

    /// Total attempts this policy allows (initial try + retries).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Decide whether to retry after the given attempt.
    ///
    /// `attempt` is zero-based: the first failed attempt passes 0. The delay
    /// for attempt `n` is `min(base * 2^n, cap)`.
    #[must_use]
    pub fn decide(&self, class: ErrorClass, attempt: u32) -> RetryDecision {
        let retryable = matches!(class, ErrorClass::GatewayError | ErrorClass::NetworkError);
        if !retryable || attempt >= self.max_retries {
            return RetryDecision::Stop;
        }

        // Shift is clamped so the multiplier cannot overflow before the cap
        // applies.
        let multiplier = 1u32 << attempt.min(8);
        let delay = self.base_delay.saturating_mul(multiplier).min(self.max_delay);
        RetryDecision::Retry(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(4), 2)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the retry policy.
    use super::*;

    #[test]
    fn gateway_errors_retry_with_doubling_delay() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(4), 3);

        assert_eq!(policy.decide(ErrorClass::GatewayError, 0), RetryDecision::Retry(Duration::from_secs(1)));
        assert_eq!(policy.decide(ErrorClass::GatewayError, 1), RetryDecision::Retry(Duration::from_secs(2)));
        assert_eq!(policy.decide(ErrorClass::GatewayError, 2), RetryDecision::Retry(Duration::from_secs(4)));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(4), 10);

        // 2^5 seconds would be 32s without the cap.
        assert_eq!(policy.decide(ErrorClass::NetworkError, 5), RetryDecision::Retry(Duration::from_secs(4)));
    }

    #[test]
    fn stops_after_max_retries() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(4), 2);

        assert!(matches!(policy.decide(ErrorClass::GatewayError, 1), RetryDecision::Retry(_)));
        assert_eq!(policy.decide(ErrorClass::GatewayError, 2), RetryDecision::Stop);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn auth_and_client_errors_never_retry() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.decide(ErrorClass::AuthError, 0), RetryDecision::Stop);
        assert_eq!(policy.decide(ErrorClass::ClientError, 0), RetryDecision::Stop);
        assert_eq!(policy.decide(ErrorClass::Success, 0), RetryDecision::Stop);
    }

    #[test]
    fn delays_are_non_decreasing() {
        let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(4), 6);

        let mut last = Duration::ZERO;
        for attempt in 0..6 {
            match policy.decide(ErrorClass::GatewayError, attempt) {
                RetryDecision::Retry(delay) => {
                    assert!(delay >= last);
                    last = delay;
                }
                RetryDecision::Stop => panic!("expected retry at attempt {attempt}"),
            }
        }
    }
}
