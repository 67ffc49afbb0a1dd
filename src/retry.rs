//! Bounded, fixed-delay retry of transactional work.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{classify, matching_rule, Retryability};
use crate::errors::{Error, ErrorKind, Result};
use crate::redact::redact;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// How often and how patiently to retry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Where one attempt ended up.
enum Outcome<T> {
    Succeeded(T),
    FailedRetryable(Error),
    FailedFatal(Error),
}

impl<T> Outcome<T> {
    fn of(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Succeeded(value),
            Err(err) if err.kind() == ErrorKind::Cancelled => Outcome::FailedFatal(err),
            Err(err) => match classify(&err) {
                Retryability::Retryable => Outcome::FailedRetryable(err),
                Retryability::Fatal => Outcome::FailedFatal(err),
            },
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `attempt` until it succeeds, fails with a fatal error, or the attempts run out.
    ///
    /// `attempt` receives the 1-based attempt number. Exhaustion is reported as
    /// [`Error::RetriesExhausted`] wrapping the last error. Cancellation stops the loop
    /// immediately, including during the wait between attempts.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut number: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let err = match Outcome::of(attempt(number).await) {
                Outcome::Succeeded(value) => {
                    if number > 1 {
                        debug!(operation, attempts = number, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Outcome::FailedFatal(err) => return Err(err),
                Outcome::FailedRetryable(err) => err,
            };

            if number >= max_attempts {
                warn!(
                    operation,
                    attempts = number,
                    error = %redact(&err.to_string()),
                    "retries exhausted"
                );
                return Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: number,
                    source: Box::new(err),
                });
            }

            warn!(
                operation,
                attempt = number,
                max_attempts,
                delay_ms = self.delay.as_millis() as u64,
                reason = matching_rule(&err).map(|rule| rule.name).unwrap_or("unknown"),
                error = %redact(&err.to_string()),
                "retrying after conflicting configuration change"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
            number += 1;
        }
    }
}
