//! Bounded polling with exponential backoff.
//!
//! Eventually consistent providers may not reflect a mutation immediately, so
//! both verification and teardown probe the provider repeatedly. Every loop is
//! bounded twice: by a number of attempts and by a wall-clock budget.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;

/// Retry schedule of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay after the first failed attempt.
    pub initial_interval: Duration,
    /// Upper bound of any single delay.
    pub max_interval: Duration,
    /// Growth factor applied to the delay after every attempt.
    pub multiplier: f64,
    /// Maximum number of probes, including the first one.
    pub max_attempts: u32,
    /// Wall-clock budget of the whole loop.
    pub timeout: Duration,
}

impl PollPolicy {
    /// A policy that probes exactly once, for strongly consistent providers.
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 1.0,
            max_attempts: 1,
            timeout,
        }
    }

    /// Returns a copy with a different wall-clock budget.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(scaled)
    }
}

/// Why a poll loop gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    Attempts,
    Timeout,
}

/// Result of [`poll_with_backoff`].
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    /// The probe reported completion.
    Ready { value: T, attempts: u32 },
    /// The loop gave up. `last` is the most recent pending reason, or `None`
    /// if the budget ran out before any probe returned.
    Exhausted {
        last: Option<E>,
        attempts: u32,
        reason: Exhaustion,
    },
}

/// Runs `probe` until it breaks, the attempts run out or the budget elapses.
///
/// The probe receives the 1-based attempt number. `ControlFlow::Break` ends
/// the loop with a value, `ControlFlow::Continue` schedules another attempt
/// after the backoff delay and records the pending reason.
pub async fn poll_with_backoff<T, E, F, Fut>(policy: &PollPolicy, mut probe: F) -> PollOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ControlFlow<T, E>>,
{
    let started = Instant::now();
    let mut last = None;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let remaining = policy.timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, probe(attempt)).await {
            Ok(ControlFlow::Break(value)) => {
                return PollOutcome::Ready {
                    value,
                    attempts: attempt,
                };
            }
            Ok(ControlFlow::Continue(pending)) => last = Some(pending),
            Err(_) => {
                return PollOutcome::Exhausted {
                    last,
                    attempts: attempt,
                    reason: Exhaustion::Timeout,
                };
            }
        }

        if attempt >= policy.max_attempts {
            return PollOutcome::Exhausted {
                last,
                attempts: attempt,
                reason: Exhaustion::Attempts,
            };
        }

        let delay = policy.delay_after(attempt);
        if started.elapsed() + delay > policy.timeout {
            return PollOutcome::Exhausted {
                last,
                attempts: attempt,
                reason: Exhaustion::Timeout,
            };
        }
        tokio::time::sleep(delay).await;
    }
}
