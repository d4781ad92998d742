//! Bounded retries for LLM requests.
//!
//! A request is tried at most [`MAX_ATTEMPTS`] times. Sleeps between attempts
//! grow exponentially and their sum never exceeds `max_total_delay`, which
//! clients set to the request timeout.

use crate::error::LlmError;
use crate::models::MAX_ATTEMPTS;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff settings for one client.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Retries after the first attempt, clamped to `MAX_ATTEMPTS - 1`
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on the sum of all sleeps
    pub max_total_delay: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: MAX_ATTEMPTS - 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            max_total_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no sleeps.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_total_delay(mut self, budget: Duration) -> Self {
        self.max_total_delay = budget;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    fn backoff(&self) -> Backoff {
        let retries = if self.enabled {
            self.max_retries.min(MAX_ATTEMPTS - 1)
        } else {
            0
        };
        Backoff {
            next: self.initial_delay.min(self.max_delay),
            max_delay: self.max_delay,
            multiplier: f64::from(self.backoff_multiplier.max(1.0)),
            retries_left: retries,
            budget: self.max_total_delay,
        }
    }
}

/// Sleep schedule for one request. Ends when the retries or the delay
/// budget run out.
#[derive(Debug)]
struct Backoff {
    next: Duration,
    max_delay: Duration,
    multiplier: f64,
    retries_left: u32,
    budget: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.retries_left == 0 || self.next > self.budget {
            return None;
        }
        let delay = self.next;
        self.retries_left -= 1;
        self.budget -= delay;
        self.next = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        Some(delay)
    }
}

/// 408, 429 and every 5xx.
#[must_use]
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

/// Transport failures and transient statuses. Unusable bodies and
/// configuration problems fail the same way on every attempt.
#[must_use]
pub fn is_transient(error: &LlmError) -> bool {
    match error {
        LlmError::Unavailable { status: None, .. } => true,
        LlmError::Unavailable { status: Some(code), .. } => is_transient_status(*code),
        LlmError::Response { .. } | LlmError::Configuration { .. } => false,
    }
}

/// Run `send` until it succeeds, fails permanently or the backoff ends.
pub async fn send_with_retry<T, Op, Fut>(config: &RetryConfig, mut send: Op) -> Result<T, LlmError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut backoff = config.backoff();
    let mut attempt: u32 = 1;

    loop {
        let error = match send().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !is_transient(&error) {
            return Err(error);
        }
        let Some(delay) = backoff.next() else {
            return Err(error);
        };

        warn!(
            attempt,
            max_attempts = MAX_ATTEMPTS,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient LLM failure, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
