//! Retry overlay for the handler chain.
//!
//! [`RetryHandler`] wraps its continuation and re-issues failed operations
//! according to a [`RetryPolicy`]: transient faults are retried with a fast
//! exponential backoff, throttling faults with a much slower one, and
//! everything else surfaces immediately. Send operations additionally go
//! through a stream-replay safety gate: a message body is only resent when
//! it can be proven to represent the original, unconsumed payload.
//!
//! Backoff waits are plain `tokio::time::sleep` suspensions; dropping the
//! in-flight future cancels the loop without surfacing a transient fault.

use super::handler::PipelineHandler;
use crate::errors::TransportError;
use crate::message::Message;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Maximum number of attempts per logical operation call.
pub const MAX_ATTEMPTS: usize = 75;

/// An exponential backoff schedule bounded by an attempt budget.
///
/// The delay for attempt `n` is `base + (2^n - 1) * jittered_increment`,
/// capped at `cap`; the increment is jittered by ±20% to spread retry storms.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: usize,
    base: Duration,
    increment: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    /// Creates a schedule with the given bounds.
    #[must_use]
    pub fn new(max_attempts: usize, base: Duration, increment: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            increment,
            cap,
        }
    }

    /// Returns the delay before the retry following attempt `attempt`
    /// (0-indexed), or `None` once the attempt budget is spent.
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        let increment_ms = self.increment.as_secs_f64() * 1000.0 * jitter;
        let growth = (2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX)) - 1.0) * increment_ms;
        let delay_ms = (self.base.as_secs_f64() * 1000.0 + growth)
            .min(self.cap.as_secs_f64() * 1000.0);
        Some(Duration::from_millis(delay_ms as u64))
    }
}

/// Transient-fault classifier paired with two backoff schedules.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    default_backoff: ExponentialBackoff,
    throttling_backoff: ExponentialBackoff,
}

impl RetryPolicy {
    /// Creates the standard policy: fast backoff (100 ms base, 100 ms
    /// increment, 10 s cap) for ordinary transient faults and slow backoff
    /// (10 s base, 5 s increment, 60 s cap) for throttling, both bounded by
    /// [`MAX_ATTEMPTS`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_backoff: ExponentialBackoff::new(
                MAX_ATTEMPTS,
                Duration::from_millis(100),
                Duration::from_millis(100),
                Duration::from_secs(10),
            ),
            throttling_backoff: ExponentialBackoff::new(
                MAX_ATTEMPTS,
                Duration::from_secs(10),
                Duration::from_secs(5),
                Duration::from_secs(60),
            ),
        }
    }

    /// Decides whether a failure qualifies for another attempt.
    ///
    /// A fault is retryable only if its kind is transient and its
    /// stop-retrying marker is not set; the marker is consumed (cleared)
    /// when it vetoes, so the same error value is not permanently poisoned.
    pub fn is_retryable(&self, error: &mut TransportError) -> bool {
        if !error.is_transient() {
            return false;
        }
        !error.take_stop_retrying()
    }

    /// Returns the delay before the next attempt, drawn from the throttling
    /// schedule for throttled faults and the default schedule otherwise, or
    /// `None` once the budget is spent.
    #[must_use]
    pub fn delay_for(&self, error: &TransportError, attempt: usize) -> Option<Duration> {
        if error.is_throttled() {
            self.throttling_backoff.delay_for(attempt)
        } else {
            self.default_backoff.delay_for(attempt)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call state for a send operation's retry loop.
///
/// Created fresh for every top-level call and discarded when the loop
/// concludes, so concurrent calls through one handler never share state.
#[derive(Debug, Default)]
struct SendState {
    /// Number of attempts already executed.
    iteration: usize,
    /// Stream position observed before the first attempt; `None` means
    /// undetermined (non-seekable, or inconsistent across a batch).
    initial_position: Option<u64>,
    /// The transient fault captured by the most recent failed attempt.
    last_error: Option<TransportError>,
}

enum Outbound<'a> {
    Single(&'a Message),
    Batch(&'a [Message]),
}

impl Outbound<'_> {
    fn messages(&self) -> &[Message] {
        match self {
            Outbound::Single(message) => std::slice::from_ref(message),
            Outbound::Batch(messages) => messages,
        }
    }
}

/// A delegating handler that retries transient failures.
pub struct RetryHandler {
    next: Option<Box<dyn PipelineHandler>>,
    policy: RetryPolicy,
}

impl RetryHandler {
    /// Creates a retry handler with the standard policy.
    #[must_use]
    pub fn new(next: Option<Box<dyn PipelineHandler>>) -> Self {
        Self::with_policy(next, RetryPolicy::new())
    }

    /// Creates a retry handler with an explicit policy.
    #[must_use]
    pub fn with_policy(next: Option<Box<dyn PipelineHandler>>, policy: RetryPolicy) -> Self {
        Self { next, policy }
    }

    /// Retry loop for operations without replay-safety concerns.
    async fn run_with_retry<T, F, Fut>(&self, operation: F) -> Result<T, TransportError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt: usize = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(mut error) => {
                    if !self.policy.is_retryable(&mut error) {
                        return Err(error.into_normalized());
                    }
                    match self.policy.delay_for(&error, attempt) {
                        Some(delay) => {
                            attempt += 1;
                            tracing::debug!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying after transient failure"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::debug!(attempt, error = %error, "retry budget exhausted");
                            return Err(error.into_normalized());
                        }
                    }
                }
            }
        }
    }

    /// Retry loop for send operations, with the stream-replay safety gate.
    async fn send_with_retry(&self, outbound: Outbound<'_>) -> Result<(), TransportError> {
        let mut state = SendState::default();
        loop {
            if state.iteration == 0 {
                state.initial_position = record_initial_positions(&outbound);
            } else if let Err(error) = ensure_replayable(&mut state, &outbound, &self.policy) {
                tracing::warn!(error = %error, "send retry vetoed: message body not replayable");
                return Err(error.into_normalized());
            }
            state.iteration += 1;

            match self.dispatch(&outbound).await {
                Ok(()) => return Ok(()),
                Err(mut error) => {
                    if !self.policy.is_retryable(&mut error) {
                        return Err(error.into_normalized());
                    }
                    match self.policy.delay_for(&error, state.iteration - 1) {
                        Some(delay) => {
                            tracing::debug!(
                                attempt = state.iteration,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying send after transient failure"
                            );
                            state.last_error = Some(error);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::debug!(
                                attempt = state.iteration,
                                error = %error,
                                "send retry budget exhausted"
                            );
                            return Err(error.into_normalized());
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, outbound: &Outbound<'_>) -> Result<(), TransportError> {
        match (outbound, self.continuation()) {
            (Outbound::Single(message), Some(next)) => next.send_event(message).await,
            (Outbound::Batch(messages), Some(next)) => next.send_events(messages).await,
            (_, None) => Ok(()),
        }
    }
}

/// Records each outgoing body's position before the first attempt and
/// rewinds bodies that a previous partial read may have advanced.
///
/// Returns the batch-wide initial position: `None` (undetermined) if any
/// member is non-seekable, otherwise the largest observed position.
fn record_initial_positions(outbound: &Outbound<'_>) -> Option<u64> {
    let mut initial = Some(0u64);
    for message in outbound.messages() {
        match message.observed_position() {
            Some(position) => {
                message.try_reset_body(position);
                initial = initial.map(|current| current.max(position));
            }
            None => initial = None,
        }
    }
    initial
}

/// The stream-replay safety gate, evaluated before every re-attempt.
///
/// Only a recorded starting position of exactly zero is retry-safe: a
/// partially-read stream mid-transmission cannot be proven representative
/// of the original payload unless transmission had not begun. A veto marks
/// the captured fault stop-retrying and hands it back through the
/// classifier, which consumes the marker.
fn ensure_replayable(
    state: &mut SendState,
    outbound: &Outbound<'_>,
    policy: &RetryPolicy,
) -> Result<(), TransportError> {
    let safe = state.initial_position == Some(0)
        && outbound
            .messages()
            .iter()
            .all(|message| !message.is_body_read() || message.try_reset_body(0));
    if safe {
        return Ok(());
    }

    let mut error = state.last_error.take().unwrap_or_else(|| {
        TransportError::new(
            crate::errors::FaultKind::Protocol,
            "send retry aborted: message body cannot be replayed",
        )
    });
    error.set_stop_retrying(true);
    let _ = policy.is_retryable(&mut error);
    Err(error)
}

#[async_trait::async_trait]
impl PipelineHandler for RetryHandler {
    fn continuation(&self) -> Option<&dyn PipelineHandler> {
        self.next.as_deref()
    }

    fn continuation_mut(&mut self) -> Option<&mut (dyn PipelineHandler + 'static)> {
        self.next.as_deref_mut()
    }

    async fn open(&self, explicit_open: bool) -> Result<(), TransportError> {
        self.run_with_retry(|| async move {
            match self.continuation() {
                Some(next) => next.open(explicit_open).await,
                None => Ok(()),
            }
        })
        .await
    }

    async fn send_event(&self, message: &Message) -> Result<(), TransportError> {
        self.send_with_retry(Outbound::Single(message)).await
    }

    async fn send_events(&self, messages: &[Message]) -> Result<(), TransportError> {
        self.send_with_retry(Outbound::Batch(messages)).await
    }

    async fn receive(&self) -> Result<Option<Message>, TransportError> {
        self.run_with_retry(|| async move {
            match self.continuation() {
                Some(next) => next.receive().await,
                None => Ok(None),
            }
        })
        .await
    }

    async fn receive_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Message>, TransportError> {
        self.run_with_retry(|| async move {
            match self.continuation() {
                Some(next) => next.receive_with_timeout(timeout).await,
                None => Ok(None),
            }
        })
        .await
    }

    async fn complete(&self, lock_token: &str) -> Result<(), TransportError> {
        self.run_with_retry(|| async move {
            match self.continuation() {
                Some(next) => next.complete(lock_token).await,
                None => Ok(()),
            }
        })
        .await
    }

    async fn abandon(&self, lock_token: &str) -> Result<(), TransportError> {
        self.run_with_retry(|| async move {
            match self.continuation() {
                Some(next) => next.abandon(lock_token).await,
                None => Ok(()),
            }
        })
        .await
    }

    async fn reject(&self, lock_token: &str) -> Result<(), TransportError> {
        self.run_with_retry(|| async move {
            match self.continuation() {
                Some(next) => next.reject(lock_token).await,
                None => Ok(()),
            }
        })
        .await
    }
}
