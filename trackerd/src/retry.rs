//! Cancellable retry with backoff.
//!
//! The connection uses this to keep trying to acquire the store until it
//! succeeds or the attempt is superseded. Delays follow a two-step policy:
//! the base interval for the first failures, then the base interval times a
//! slow-down factor to bound load against a store that stays unreachable.
//!
//! ```text
//! attempt 1 ── fail ── base ── attempt 2 ── ... ── attempt 11 ── fail ── base × factor ── ...
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

// =============================================================================
// Policy
// =============================================================================

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after each of the first `slowdown_after` failures
    pub interval: Duration,
    /// Number of consecutive failures before slowing down
    pub slowdown_after: u32,
    /// Multiplier applied to `interval` once slowed down
    pub slowdown_factor: u32,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(interval: Duration, slowdown_after: u32, slowdown_factor: u32) -> Self {
        Self {
            interval,
            slowdown_after,
            slowdown_factor,
        }
    }

    /// Delay to wait after the `failures`-th consecutive failure.
    pub fn delay_after_failure(&self, failures: u32) -> Duration {
        if failures <= self.slowdown_after {
            self.interval
        } else {
            self.interval.saturating_mul(self.slowdown_factor.max(1))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), 10, 10)
    }
}

// =============================================================================
// Retry Loop
// =============================================================================

/// Run `operation` until it succeeds or `token` is cancelled.
///
/// `operation` receives the 1-based attempt number. After every failure
/// `on_failure(failures, &error, delay)` is called before waiting `delay`.
/// Cancellation interrupts both a running attempt and a pending wait; the
/// function then returns `None`.
pub async fn retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
    mut on_failure: R,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E, Duration),
{
    let mut failures: u32 = 0;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            outcome = operation(failures.saturating_add(1)) => outcome,
        };

        match outcome {
            Ok(value) => return Some(value),
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay = policy.delay_after_failure(failures);
                on_failure(failures, &err, delay);

                tokio::select! {
                    biased;
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {},
                }
            },
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns the cancellation token of the retry sequence currently in flight.
///
/// At most one sequence is pending at a time: arming a new one cancels the
/// previous sequence first.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    pending: Option<CancellationToken>,
}

impl RetryScheduler {
    /// Create a scheduler with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    /// The delay policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Cancel any pending sequence and return the token for a new one.
    pub fn arm(&mut self) -> CancellationToken {
        self.reset();
        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        token
    }

    /// Cancel the pending sequence, if any.
    ///
    /// The next `arm()` starts again from the base interval.
    pub fn reset(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    /// Forget the pending sequence after it finished on its own.
    pub fn finish(&mut self) {
        self.pending = None;
    }

    /// Whether a sequence is in flight.
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================
