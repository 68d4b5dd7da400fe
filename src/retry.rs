// src/retry.rs
//! One retry policy shared by every HTTP adapter.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use crate::error::{DeliveryError, FetchError};

/// Errors that know whether another attempt could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        FetchError::is_transient(self)
    }
}

impl Transient for DeliveryError {
    fn is_transient(&self) -> bool {
        DeliveryError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retrying.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_delay)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Drive `op` until it succeeds, fails permanently, or runs out of attempts.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let mut schedule = self.schedule();
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && e.is_transient() => {
                    let delay = schedule.next_backoff().unwrap_or(self.max_delay);
                    tracing::warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::error!(what, attempts = attempt, error = %e, "giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_attempts(attempts)
            .with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<u32, FetchError> = fast(3)
            .run("test", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(FetchError::Status {
                        status: StatusCode::SERVICE_UNAVAILABLE,
                        body: String::new(),
                    })
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(out.unwrap(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), FetchError> = fast(5)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Parse("bad json".into()))
            })
            .await;
        assert!(out.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), DeliveryError> = fast(2)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DeliveryError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    body: String::new(),
                })
            })
            .await;
        assert!(out.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
