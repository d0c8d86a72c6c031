//! Retry policy with linear backoff and optional jitter.

use std::time::Duration;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Delay grows with the attempt number: `base * attempt`.
    Linear {
        /// Delay before the first retry.
        base: Duration,
        /// Whether to apply random jitter (+/- 25%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_millis(2_000),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Linear { base, jitter } => {
                let delay = base.saturating_mul(attempt.max(1));
                if !jitter {
                    return delay;
                }

                let delay_ms = delay.as_millis() as u64;
                let jitter_ms = delay_ms / 4;
                let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                Duration::from_millis((delay_ms + random_offset).saturating_sub(jitter_ms))
            }
        }
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
    /// HTTP status codes that trigger a retry.
    pub retry_on_status: Vec<u16>,
    /// Whether to retry on request timeouts.
    pub retry_on_timeout: bool,
    /// Whether to retry on connection errors.
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
            retry_on_status: vec![408, 429, 500, 502, 503, 504],
            retry_on_timeout: true,
            retry_on_connect: true,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}
