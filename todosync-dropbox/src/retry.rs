//! Bounded retry with exponential backoff for transient remote failures.

use std::time::Duration;

use todosync_core::{Config, RemoteError};

/// How often, and how patiently, to retry a failed remote call.
///
/// Only errors for which [`RemoteError::is_retryable`] holds are retried;
/// the delay doubles after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_backoff)
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op`, retrying transient failures up to `max_retries` times.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed ({}); retry {}/{} in {}ms",
                        what,
                        err,
                        attempt + 1,
                        self.max_retries,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn unavailable() -> RemoteError {
        RemoteError::Status {
            code: 503,
            message: "busy".into(),
        }
    }

    #[test]
    fn delay_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result = policy.run("list", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(unavailable())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_retries() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(1, Duration::from_millis(1));
        let result: Result<(), _> = policy.run("upload", || {
            calls.set(calls.get() + 1);
            Err(unavailable())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<(), _> = policy.run("download", || {
            calls.set(calls.get() + 1);
            Err(RemoteError::Status {
                code: 401,
                message: "invalid_access_token".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
