//! Exponential backoff shared by the source connector and enrichment engine.
//!
//! A [`RetryPolicy`] is built from the `[retry]` config section and injected
//! into every component that talks to the network. Only errors for which
//! [`AnswerBankError::is_transient`] holds are retried.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AnswerBankError;

/// Retry behavior for transient upstream failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Randomize each delay into `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

/// Successful outcome, with the number of retries it took.
#[derive(Debug, Clone)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

/// Final error once the policy gave up (or the error was permanent).
#[derive(Debug)]
pub struct Exhausted {
    pub error: AnswerBankError,
    pub attempts: u32,
}

impl Exhausted {
    /// Whether the policy stopped because the error was not retryable.
    pub fn is_permanent(&self) -> bool {
        !self.error.is_transient()
    }
}

impl std::fmt::Display for Exhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return delay;
        }
        let mut bytes = [0u8; 8];
        match getrandom::fill(&mut bytes) {
            Ok(()) => {
                let noise = u64::from_le_bytes(bytes) as f64 / u64::MAX as f64;
                delay.mul_f64(0.5 + noise / 2.0)
            }
            Err(e) => {
                debug!(error = %e, "no randomness available, backing off without jitter");
                delay
            }
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Retried<T>, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AnswerBankError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        retries: attempt - 1,
                    });
                }
                Err(error) if !error.is_transient() => {
                    debug!(label, attempt, error = %error, "permanent failure, not retrying");
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(label, attempts = attempt, error = %error, "retries exhausted");
                    return Err(Exhausted {
                        error,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let delay = self.delay_for(attempt - 1);
                    debug!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(700),
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(700));
        assert_eq!(policy.delay_for(40), Duration::from_millis(700));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let policy = RetryPolicy {
            jitter: true,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        let delays: Vec<Duration> = (0..50).map(|_| policy.delay_for(0)).collect();
        for d in &delays {
            assert!(*d >= Duration::from_millis(500) && *d <= Duration::from_millis(1_000));
        }
        // Fifty identical draws from a 64-bit source do not happen.
        assert!(delays.iter().any(|d| *d != delays[0]));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = fast()
            .run("test", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AnswerBankError::RateLimited("slow down".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.value, "done");
        assert_eq!(outcome.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AnswerBankError::Network("refused".into())) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert!(!err.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AnswerBankError::Auth("invalid key".into())) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert!(err.is_permanent());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..fast()
        };
        let outcome = policy.run("test", |attempt| async move { Ok(attempt) }).await;
        assert_eq!(outcome.unwrap().value, 1);
    }
}
