//! Retry with exponential backoff for external service calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use llm_client::LlmError;
use log::warn;

use crate::tts::TtsError;

/// Classification of service errors for the retry loop.
pub trait Transient: Sized {
    /// Whether the same request may succeed if sent again.
    fn is_transient(&self) -> bool;

    /// Delay the server asked for before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Error for an attempt that exceeded its time budget.
    fn timed_out(after: Duration) -> Self;

    /// Error for a service that can no longer accept calls.
    fn unavailable(reason: String) -> Self;
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        LlmError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        LlmError::retry_after(self)
    }

    fn timed_out(after: Duration) -> Self {
        LlmError::Transport(format!("no response within {}s", after.as_secs_f32()))
    }

    fn unavailable(reason: String) -> Self {
        LlmError::ProviderUnavailable(reason)
    }
}

impl Transient for TtsError {
    fn is_transient(&self) -> bool {
        TtsError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        TtsError::retry_after(self)
    }

    fn timed_out(after: Duration) -> Self {
        TtsError::Timeout(after)
    }

    fn unavailable(reason: String) -> Self {
        TtsError::Unavailable(reason)
    }
}

/// How often and how patiently a failing call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): initial * 2^retry, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// A server `Retry-After` hint replaces the computed backoff but is still
    /// capped at `max_backoff`.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    let delay = e
                        .retry_after()
                        .map(|hint| hint.min(self.max_backoff))
                        .unwrap_or_else(|| self.backoff(retry));
                    retry += 1;
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:.1}s",
                        what,
                        retry,
                        self.max_retries + 1,
                        e,
                        delay.as_secs_f32()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
