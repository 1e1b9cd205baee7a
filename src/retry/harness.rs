//! `run(op, options) → Result` (spec §4.B).

use super::backoff::BackoffKind;
use crate::error::CoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: BackoffKind,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub jitter_factor: f64,
    pub timeout_ms: Option<u64>,
    pub cancel: Option<CancellationToken>,
    /// Overrides the default `error.retryable()` predicate, given the error
    /// and the 1-indexed attempt that just failed.
    pub retryable: Option<fn(&CoreError, u32) -> bool>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 30_000,
            backoff: BackoffKind::Exponential,
            backoff_factor: 2.0,
            jitter: true,
            jitter_factor: 0.1,
            timeout_ms: None,
            cancel: None,
            retryable: None,
        }
    }
}

/// Terminal failure: every attempt exhausted or a non-retryable error,
/// carrying the attempt count and last error (spec §4.B).
#[derive(Debug, Clone)]
pub struct RetryError {
    pub attempts: u32,
    pub last_error: CoreError,
}

impl std::fmt::Display for RetryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempt(s): {}", self.attempts, self.last_error)
    }
}

impl std::error::Error for RetryError {}

fn jittered_delay(options: &RetryOptions, attempt: u32) -> Duration {
    let base = options.backoff.delay_ms(attempt, options.initial_delay_ms, options.backoff_factor);
    let with_jitter = if options.jitter {
        let j = options.jitter_factor.clamp(0.0, 1.0);
        let factor = 1.0 + rand::thread_rng().gen_range(-j..=j);
        ((base as f64) * factor).max(0.0) as u64
    } else {
        base
    };
    let clamped = with_jitter.clamp(options.initial_delay_ms, options.max_delay_ms);
    Duration::from_millis(clamped)
}

fn is_retryable(options: &RetryOptions, error: &CoreError, attempt: u32) -> bool {
    match options.retryable {
        Some(predicate) => predicate(error, attempt),
        None => error.retryable(),
    }
}

/// Runs `op`, retrying per `options` until it succeeds, a non-retryable
/// error is hit, attempts are exhausted, or cancellation/timeout fires.
pub async fn run<F, Fut, T>(mut op: F, options: RetryOptions) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let external_cancel = options.cancel.clone().unwrap_or_default();
    let mut last_error = CoreError::validation("retry harness invoked with zero max_attempts");

    for attempt in 1..=options.max_attempts.max(1) {
        if external_cancel.is_cancelled() {
            return Err(RetryError { attempts: attempt - 1, last_error: CoreError::Cancelled });
        }

        let attempt_result = run_one_attempt(&mut op, &options, &external_cancel).await;

        match attempt_result {
            Ok(value) => return Ok(value),
            Err(error) => {
                last_error = error;
                let retryable = is_retryable(&options, &last_error, attempt);
                if !retryable || attempt == options.max_attempts {
                    return Err(RetryError { attempts: attempt, last_error });
                }
                let delay = jittered_delay(&options, attempt);
                tokio::select! {
                    _ = external_cancel.cancelled() => {
                        return Err(RetryError { attempts: attempt, last_error: CoreError::Cancelled });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Err(RetryError { attempts: options.max_attempts, last_error })
}

async fn run_one_attempt<F, Fut, T>(
    op: &mut F,
    options: &RetryOptions,
    external_cancel: &CancellationToken,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let attempt_future = op();
    match options.timeout_ms {
        None => {
            tokio::select! {
                _ = external_cancel.cancelled() => Err(CoreError::Cancelled),
                result = attempt_future => result,
            }
        }
        Some(timeout_ms) => {
            tokio::select! {
                _ = external_cancel.cancelled() => Err(CoreError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                    Err(CoreError::Timeout { operation_name: "retry::run".to_string(), timeout_ms })
                }
                result = attempt_future => result,
            }
        }
    }
}
