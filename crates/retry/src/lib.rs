//! Bounded retries with exponential backoff
//!
//! Only transient chain failures are retried: anchor submission and leg
//! execution. Everything else surfaces on the first attempt.

pub mod backoff;

pub use backoff::{ExponentialBackoff, RetryPolicy};

use std::fmt::Display;
use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("non-retryable failure after {attempts} attempts: {error}")]
    Permanent { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Permanent { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Permanent { error, .. } => error,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy runs out.
///
/// `op` receives the zero-based attempt number. `is_retryable` decides
/// whether a failure is worth another attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0u32;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !is_retryable(&error) => {
                return Err(RetryError::Permanent {
                    attempts: attempt + 1,
                    error,
                });
            }
            Err(error) if attempt >= policy.max_retries => {
                tracing::warn!(
                    operation = operation,
                    attempts = attempt + 1,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last_error: error,
                });
            }
            Err(error) => {
                let delay = backoff.next_delay();
                tracing::debug!(
                    operation = operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
