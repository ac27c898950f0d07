//! Retry policy with exponential backoff and jitter

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Per-provider retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per provider, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Ceiling for the exponential part of the delay
    pub max_delay: Duration,

    /// Upper bound of the random jitter added on top
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff without the random part, for a 0-indexed failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// `min(max_delay, base_delay * 2^attempt) + uniform(0..=max_jitter)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }

    /// Whether another attempt follows a failed 0-indexed attempt
    pub fn has_next_attempt(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Worst-case time spent sleeping for one provider
    pub fn worst_case_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.backoff(attempt) + self.max_jitter)
            .sum()
    }
}

/// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
