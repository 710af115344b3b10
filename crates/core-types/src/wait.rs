//! Bounded-wait primitive shared by every polling layer.
//!
//! The engine never blocks on browser or filesystem events; it polls with a
//! fixed sleep interval under a hard deadline. Cancellation is simply the
//! deadline elapsing.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Deadline plus polling interval for one bounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSpec {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSpec {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Shorthand for the common "seconds budget, default cadence" case.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Duration::from_millis(350),
        }
    }

    /// Derive a spec with the same cadence but a different budget.
    pub fn rebudget(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }
}

/// A bounded wait ran out of budget without the condition holding.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("condition not met within {waited:?}")]
pub struct WaitElapsed {
    pub waited: Duration,
}

/// Polls `probe` until it yields a value or the budget elapses.
///
/// The probe always runs at least once, even with a zero timeout; callers
/// rely on that to guarantee "every candidate was attempted" semantics.
pub async fn poll_until<T, F, Fut>(spec: PollSpec, mut probe: F) -> Result<T, WaitElapsed>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + spec.timeout;
    loop {
        if let Some(value) = probe().await {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(WaitElapsed {
                waited: spec.timeout,
            });
        }
        sleep(spec.interval).await;
    }
}
