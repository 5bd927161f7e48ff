//! Bounded retry state machine for model calls.
//!
//! One run of [`run_with_retry`] walks through:
//!
//! ```text
//!   Attempt(n) --ok--------------------------------------> Done(value)
//!   Attempt(n) --err, non-transient----------------------> GiveUp(Unavailable)
//!   Attempt(n) --err, transient, n == max_attempts-------> GiveUp(Unavailable)
//!   Attempt(n) --err, transient--> Backoff(delay) ------> Attempt(n + 1)
//!   any state  --cancelled-------------------------------> Cancelled
//! ```
//!
//! The state itself ([`RetryState`]) is plain data (attempt count, last error,
//! next delay) so it can be driven and tested without any I/O.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error_handler::{AiLlmError, Result};

/// Base delay before the first retry.
pub const BASE_BACKOFF_MS: u64 = 500;
/// Upper bound for a single backoff (also caps `Retry-After`).
pub const MAX_BACKOFF_MS: u64 = 8_000;
/// Retries after the first attempt; three attempts in total.
pub const MAX_RETRIES: u32 = 2;

/// Retry/backoff knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Randomize each delay within [50%, 100%] of the exponential value.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic exponential delay for the given retry index (0-based), capped.
    pub fn backoff_for(&self, retry_index: u32) -> Duration {
        let shift = retry_index.min(16);
        let raw = self.base_backoff.saturating_mul(1_u32 << shift);
        raw.min(self.max_backoff)
    }

    /// Delay actually slept: jittered backoff, stretched to honour `Retry-After`.
    pub fn delay_for(&self, retry_index: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.backoff_for(retry_index);
        let backoff = if self.jitter { jitter(base) } else { base };
        match retry_after {
            Some(hint) => backoff.max(hint.min(self.max_backoff)),
            None => backoff,
        }
    }
}

/// Picks a delay uniformly in `[base / 2, base]`.
fn jitter(base: Duration) -> Duration {
    let high = base.as_millis() as u64;
    if high <= 1 {
        return base;
    }
    let low = high / 2;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

/// What the loop should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Retry(Duration),
    GiveUp,
}

/// Attempt count, last error and next delay for one logical call.
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
    next_delay: Option<Duration>,
    last_error: Option<AiLlmError>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay chosen by the last [`RetryState::on_failure`] that allowed a retry.
    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    pub fn last_error(&self) -> Option<&AiLlmError> {
        self.last_error.as_ref()
    }

    /// Marks the start of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.next_delay = None;
        self.attempts
    }

    /// Records a failed attempt and decides whether another one is allowed.
    pub fn on_failure(&mut self, policy: &RetryPolicy, err: AiLlmError) -> RetryStep {
        let transient = err.is_transient();
        let retry_after = err.retry_after();
        self.last_error = Some(err);

        if !transient || self.attempts >= policy.max_attempts() {
            self.next_delay = None;
            return RetryStep::GiveUp;
        }

        let delay = policy.delay_for(self.attempts.saturating_sub(1), retry_after);
        self.next_delay = Some(delay);
        RetryStep::Retry(delay)
    }

    /// Converts the state into the terminal error after giving up.
    pub fn into_unavailable(self) -> AiLlmError {
        let attempts = self.attempts;
        match self.last_error {
            Some(last) => AiLlmError::Unavailable {
                attempts,
                last: Box::new(last),
            },
            None => AiLlmError::Cancelled { attempts },
        }
    }
}

/// Runs `op` under `policy`, honouring `cancel` between and during attempts.
///
/// `op` receives the 1-based attempt number. It is expected to enforce its own
/// per-attempt timeout and to report failures as single-attempt errors; this
/// function decides which of them are retried.
///
/// # Errors
/// - [`AiLlmError::Unavailable`] once retries are exhausted or on a non-transient failure
/// - [`AiLlmError::Cancelled`] if `cancel` fires first
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = RetryState::new();

    loop {
        if cancel.is_cancelled() {
            return Err(AiLlmError::Cancelled {
                attempts: state.attempts(),
            });
        }

        let attempt = state.begin_attempt();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AiLlmError::Cancelled { attempts: attempt });
            }
            r = op(attempt) => r,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "model call recovered after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let reason = err.to_string();
        match state.on_failure(policy, err) {
            RetryStep::Retry(delay) => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "transient model failure, backing off"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(AiLlmError::Cancelled { attempts: attempt });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryStep::GiveUp => {
                warn!(attempt, error = %reason, "giving up on model call");
                return Err(state.into_unavailable());
            }
        }
    }
}

/// Parses a `Retry-After` header value: delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at: DateTime<Utc> = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0)))
}
