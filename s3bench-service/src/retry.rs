//! Retrying of backend requests.
//!
//! A [`RetryPolicy`] runs a request until it succeeds, the error is final, or the attempt budget
//! is used up. Whether an error is worth retrying is decided by an injected [`Decider`]; the policy
//! itself only owns the attempt budget, the delay between attempts and the retry counter reported
//! at the end of every benchmark phase.
//!
//! The delay between attempts is constant. There is no exponential backoff.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::backend::BackendError;
use crate::classify::{ErrorClass, classify, is_recoverable_network_failure};
use crate::error::{Error, Result};

/// Default number of attempts per request, including the initial one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Default delay between two attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How a decider judges a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The error is final and must not be retried.
    Fail,
    /// The error belongs to a class that is retried.
    Retry(ErrorClass),
    /// A network failure that a fresh connection usually recovers from.
    Recover,
    /// No opinion, the attempt budget alone decides.
    Defer,
}

/// A function judging whether a failed attempt should be retried.
pub type Decider = fn(&BackendError) -> Verdict;

/// The decider used by benchmark endpoints.
///
/// Rules are checked in order, the first match wins:
///  1. missing objects are final,
///  2. transient, server and client errors are retried,
///  3. connection resets, exhausted local ports and `500`/`522` responses are recovered from,
///  4. everything else is left to the attempt budget.
pub fn standard_decider(error: &BackendError) -> Verdict {
    match classify(error) {
        ErrorClass::NotFound => Verdict::Fail,
        class @ (ErrorClass::Transient | ErrorClass::ServerError | ErrorClass::ClientError) => {
            Verdict::Retry(class)
        }
        _ if is_recoverable_network_failure(error) => Verdict::Recover,
        _ => Verdict::Defer,
    }
}

/// State of one logical request across its attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryToken {
    /// Number of retries performed so far.
    pub attempt: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
    /// Retry cost charged for this request. Retries are free.
    pub cost: u32,
}

/// The outcome of [`RetryPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request should be attempted again.
    pub retry: bool,
    /// How long to wait before the next attempt.
    pub delay: Duration,
}

/// Decides about and performs retries of failed backend requests.
#[derive(Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    decider: Decider,
    retries: AtomicU64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy with the [`standard_decider`].
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            decider: standard_decider,
            retries: AtomicU64::new(0),
        }
    }

    /// Replaces the function judging failed attempts.
    pub fn with_decider(mut self, decider: Decider) -> Self {
        self.decider = decider;
        self
    }

    /// The maximum number of attempts per request, including the initial one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The token a new request starts with.
    pub fn initial_token(&self) -> RetryToken {
        RetryToken {
            attempt: 0,
            delay: self.delay,
            cost: 0,
        }
    }

    /// Decides whether to retry after `attempts` failed attempts, the last one failing with
    /// `error`.
    pub fn decide(&self, error: &BackendError, attempts: u32) -> Decision {
        self.decide_verdict((self.decider)(error), attempts)
    }

    fn decide_verdict(&self, verdict: Verdict, attempts: u32) -> Decision {
        let retry = match verdict {
            Verdict::Fail => false,
            Verdict::Retry(_) | Verdict::Recover | Verdict::Defer => attempts < self.max_attempts,
        };

        Decision {
            retry,
            delay: if retry { self.delay } else { Duration::ZERO },
        }
    }

    /// Runs `op` until it succeeds or the policy gives up.
    ///
    /// `key` identifies the request in errors and logs.
    pub async fn run<T, F, Fut>(&self, key: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut token = self.initial_token();

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let attempts = token.attempt + 1;
            let verdict = (self.decider)(&error);
            let decision = self.decide_verdict(verdict, attempts);

            if !decision.retry {
                return Err(match verdict {
                    Verdict::Fail if classify(&error) == ErrorClass::NotFound => Error::NotFound {
                        key: key.to_owned(),
                    },
                    Verdict::Fail => Error::Backend(error),
                    _ => Error::RetryExhausted {
                        key: key.to_owned(),
                        attempts,
                        source: error,
                    },
                });
            }

            match verdict {
                Verdict::Retry(class) => {
                    tracing::info!(
                        %key,
                        attempts,
                        error = &error as &dyn std::error::Error,
                        "retrying on {class} error"
                    );
                }
                Verdict::Recover | Verdict::Defer => {
                    tracing::warn!(
                        %key,
                        attempts,
                        error = &error as &dyn std::error::Error,
                        "recovering from error"
                    );
                }
                Verdict::Fail => unreachable!("final errors are never retried"),
            }

            self.record_retry();
            token = RetryToken {
                attempt: attempts,
                delay: decision.delay,
                cost: 0,
            };
            tokio::time::sleep(token.delay).await;
        }
    }

    /// The number of retries performed since the last [`reset`](Self::reset).
    pub fn retry_count(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Counts a retry performed outside of [`run`](Self::run).
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets the retry counter to zero.
    pub fn reset(&self) {
        self.retries.store(0, Ordering::Relaxed);
    }
}
