//! # Retry Executor
//!
//! Wraps one logical remote call:
//!
//! ```text
//! RateGate ──deny──▶ Err(RateLimited)
//!    │admit
//!    ▼
//! attempt 1 ─ call() under timeout ─ validate() ──ok──▶ Ok(T)
//!    │ retryable failure
//!    ▼ sleep base · 1.5^(n-1)
//! attempt n … until max_attempts, then Err(last failure kind)
//! ```
//!
//! Policy failures (oversize payload, insecure destination, non-retryable
//! HTTP status) stop immediately. So does the rate gate: it is consulted once
//! per execution, never per attempt.

use log::{debug, error, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ErrorKind, RemoteResult};
use crate::core::rate_gate::RateGate;
use crate::remote::{RawResponse, TransportError, ValidationError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
pub const BACKOFF_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub multiplier: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: DEFAULT_BASE_BACKOFF,
            multiplier: BACKOFF_MULTIPLIER,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the `attempt`-th failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.base_backoff.mul_f64(self.multiplier.powi(exponent))
    }
}

/// Maps a transport failure onto the public error surface.
pub fn classify(error: &TransportError) -> ErrorKind {
    match error {
        TransportError::Timeout => ErrorKind::Timeout,
        TransportError::TooLarge { .. } => ErrorKind::PayloadTooLarge,
        TransportError::Connect(_)
        | TransportError::Status { .. }
        | TransportError::Insecure(_) => ErrorKind::NetworkFailure,
    }
}

enum Failure {
    Transport(TransportError),
    Validation(ValidationError),
}

impl Failure {
    fn kind(&self) -> ErrorKind {
        match self {
            Failure::Transport(e) => classify(e),
            Failure::Validation(_) => ErrorKind::ValidationFailure,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Failure::Transport(e) => e.is_retryable(),
            Failure::Validation(_) => true,
        }
    }

    fn describe(&self) -> String {
        match self {
            Failure::Transport(e) => e.to_string(),
            Failure::Validation(e) => e.to_string(),
        }
    }
}

pub struct RetryExecutor {
    gate: Arc<RateGate>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(gate: Arc<RateGate>, policy: RetryPolicy) -> Self {
        Self { gate, policy }
    }

    /// Runs `call` until `validate` accepts a response or the policy gives up.
    ///
    /// `call` is invoked at most `max_attempts` times.
    pub async fn execute<T, C, Fut, V>(&self, label: &str, mut call: C, validate: V) -> RemoteResult<T>
    where
        C: FnMut() -> Fut,
        Fut: Future<Output = Result<RawResponse, TransportError>>,
        V: Fn(&RawResponse) -> Result<T, ValidationError>,
    {
        if !self.gate.try_admit() {
            warn!("{label}: refused by local rate limit");
            return Err(ErrorKind::RateLimited);
        }

        let attempts = self.policy.max_attempts.max(1);
        let mut last = ErrorKind::NetworkFailure;

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(self.policy.attempt_timeout, call()).await {
                Err(_) => Err(Failure::Transport(TransportError::Timeout)),
                Ok(Err(e)) => Err(Failure::Transport(e)),
                Ok(Ok(raw)) => validate(&raw).map_err(Failure::Validation),
            };

            let failure = match outcome {
                Ok(value) => {
                    debug!("{label}: succeeded on attempt {attempt}");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            last = failure.kind();
            if !failure.is_retryable() {
                error!("{label}: {} (not retried)", failure.describe());
                return Err(last);
            }

            if attempt < attempts {
                let wait = self.policy.backoff_for(attempt);
                warn!(
                    "{label}: attempt {attempt} failed, retrying in {:.1}s: {}",
                    wait.as_secs_f64(),
                    failure.describe()
                );
                tokio::time::sleep(wait).await;
            } else {
                error!(
                    "{label}: failed after {attempts} attempts: {}",
                    failure.describe()
                );
            }
        }

        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn executor(quota: usize) -> RetryExecutor {
        RetryExecutor::new(
            Arc::new(RateGate::new(quota, Duration::from_secs(60))),
            RetryPolicy::default(),
        )
    }

    fn accept_ok(raw: &RawResponse) -> Result<String, ValidationError> {
        String::from_utf8(raw.body.clone())
            .ok()
            .filter(|s| s == "ok")
            .ok_or(ValidationError::MissingField("ok"))
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1500));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();
        let result = executor(30)
            .execute(
                "test",
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TransportError::Connect("refused".to_string()))
                    }
                },
                accept_ok,
            )
            .await;
        assert_eq!(result, Err(ErrorKind::NetworkFailure));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 1.5s of backoff, no sleep after the last attempt.
        assert_eq!(started.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_is_retried_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = executor(30)
            .execute(
                "test",
                || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        let body = if n == 0 { "garbage" } else { "ok" };
                        Ok(RawResponse::ok(body))
                    }
                },
                accept_ok,
            )
            .await;
        assert_eq!(result, Ok("ok".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_validation_failure_is_distinguishable() {
        let result = executor(30)
            .execute("test", || async { Ok(RawResponse::ok("nope")) }, accept_ok)
            .await;
        assert_eq!(result, Err(ErrorKind::ValidationFailure));
    }

    #[tokio::test]
    async fn test_rate_limited_makes_no_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = executor(0)
            .execute(
                "test",
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(RawResponse::ok("ok"))
                    }
                },
                accept_ok,
            )
            .await;
        assert_eq!(result, Err(ErrorKind::RateLimited));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversize_payload_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = executor(30)
            .execute(
                "image",
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TransportError::TooLarge {
                            limit: 10,
                            received: 11,
                        })
                    }
                },
                accept_ok,
            )
            .await;
        assert_eq!(result, Err(ErrorKind::PayloadTooLarge));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = executor(30)
            .execute(
                "search",
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(TransportError::Status {
                            status: 401,
                            message: "Unauthorized".to_string(),
                        })
                    }
                },
                accept_ok,
            )
            .await;
        assert_eq!(result, Err(ErrorKind::NetworkFailure));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_call_times_out_each_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();
        let result = executor(30)
            .execute(
                "slow",
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::future::pending::<Result<RawResponse, TransportError>>().await
                    }
                },
                accept_ok,
            )
            .await;
        assert_eq!(result, Err(ErrorKind::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Three 5s timeouts plus 2.5s of backoff.
        assert_eq!(started.elapsed(), Duration::from_millis(17_500));
    }

    #[tokio::test]
    async fn test_one_gate_slot_per_execution() {
        let gate = Arc::new(RateGate::new(2, Duration::from_secs(60)));
        let exec = RetryExecutor::new(
            gate.clone(),
            RetryPolicy {
                base_backoff: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
        );
        let _ = exec
            .execute(
                "flaky",
                || async { Err::<RawResponse, _>(TransportError::Timeout) },
                accept_ok,
            )
            .await;
        assert_eq!(gate.in_window_at(std::time::Instant::now()), 1);
    }
}
