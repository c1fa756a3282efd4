//! Backoff and circuit breaking for text-generation backends.
//!
//! Retries belong to the provider layer; the workflow engine never retries a
//! step call itself.

use std::future::Future;
use std::time::{Duration, Instant};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt).
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,

    /// Timeout applied to each individual HTTP attempt by providers.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::api()
    }
}

impl RetryConfig {
    /// A single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self { max_attempts: 0, ..Self::api() }
    }

    /// Settings for remote LLM APIs: one retry after a second, 30s per attempt.
    pub fn api() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let delay = if self.jitter { capped * (1.0 + jitter_fraction() * 0.25) } else { capped };

        Duration::from_millis(delay as u64)
    }
}

/// Cheap jitter source in `[0.0, 1.0)` taken from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// Final result (success or the last error).
    pub result: Result<T, E>,

    /// Attempts made, including the first.
    pub attempts: u32,

    /// Wall time including delays.
    pub total_time: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Whether the operation eventually succeeded.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether more than one attempt was needed.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Get the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Retry an async operation, sleeping with backoff between failed attempts.
pub async fn retry_async<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let max_attempts = config.max_attempts + 1;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let result = operation().await;

        if result.is_ok() || attempts >= max_attempts {
            return RetryResult { result, attempts, total_time: start.elapsed() };
        }

        let delay = config.delay_for_attempt(attempts);
        tracing::debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Retrying request");
        tokio::time::sleep(delay).await;
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected without calling the backend.
    Open,
    /// A trial request is allowed through.
    HalfOpen,
}

/// Skips a backend that keeps failing, so concurrent runs fall through to the
/// next provider (or to their fallback output) without waiting on timeouts.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    failure_threshold: u32,
    reset_timeout: Duration,
    opened_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold,
            reset_timeout,
            opened_at: None,
        }
    }

    /// Current state; an open circuit turns half-open once the reset timeout passed.
    pub fn state(&mut self) -> CircuitState {
        if self.state == CircuitState::Open
            && self.opened_at.is_some_and(|at| at.elapsed() >= self.reset_timeout)
        {
            self.state = CircuitState::HalfOpen;
        }
        self.state
    }

    /// Check if the circuit allows a request.
    pub fn allow_request(&mut self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
    }

    /// Record a failed request.
    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => {}
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }
}
