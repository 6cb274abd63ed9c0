//! Bounded retry with backoff around a single platform request
//!
//! [`with_retry`] wraps any async operation returning a [`PlatformError`].
//! Errors accepted by the retryable predicate are retried up to
//! [`RetryPolicy::retries`] more times; anything else is returned on first
//! occurrence. A run that ends on a retryable error is reported as
//! [`PlatformError::RetriesExhausted`] carrying the last error seen.
//!
//! Waiting goes through a [`Sleeper`] so tests can observe delays without
//! actually sleeping.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Constant,
    /// Delay doubles before each retry, never exceeding `max`
    Exponential { max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub retries: u32,
    /// Delay before the first retry
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            retries,
            delay,
            backoff,
        }
    }

    /// Fail on the first error of any kind
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Backoff::Constant)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0 is the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Constant => self.delay,
            Backoff::Exponential { max } => self
                .delay
                .saturating_mul(2u32.saturating_pow(retry))
                .min(max),
        }
    }
}

/// Suspension point between attempts
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
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Records requested delays and returns immediately.
///
/// Clones share the same record, so a test can keep one handle while the
/// code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy runs out.
///
/// `context` only labels log lines.
pub async fn with_retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: P,
    context: &str,
    mut operation: F,
) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
    P: Fn(&PlatformError) -> bool,
{
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", context, attempt);
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt == max_attempts => {
                warn!(
                    "{} failed after {} attempts: {}",
                    context, max_attempts, e
                );
                return Err(PlatformError::RetriesExhausted {
                    attempts: max_attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    context, attempt, max_attempts, e, delay
                );
                sleeper.sleep(delay).await;
            }
        }
    }

    unreachable!("max_attempts is at least 1")
}
