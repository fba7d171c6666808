//! Cancellable, bounded polling loop.
//!
//! Evaluates a predicate immediately and then at a fixed interval until
//! it holds, the cancel signal fires, or the deadline passes. The loop
//! never overlaps predicate evaluations, and it consults the cancel
//! signal at the top of every iteration as well as during the sleep.

use podprep_common::cancel_requested;
use std::future::Future;
use tokio::sync::watch;
use tokio::time::{sleep, Duration, Instant};

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The predicate became true after `evaluations` checks (the
    /// immediate first check counts as one).
    Satisfied { evaluations: u32 },
    /// The cancel signal fired before the predicate held.
    Cancelled,
    /// The deadline passed before the predicate held.
    TimedOut,
}

/// Poll `check` every `interval` until it returns true.
pub async fn watch_until<F, Fut>(
    mut check: F,
    interval: Duration,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) -> WatchOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    let mut evaluations = 0u32;

    loop {
        if *cancel.borrow() {
            return WatchOutcome::Cancelled;
        }

        evaluations += 1;
        if check().await {
            return WatchOutcome::Satisfied { evaluations };
        }

        let now = Instant::now();
        if now >= deadline {
            return WatchOutcome::TimedOut;
        }

        // Clamp the final sleep so the last evaluation lands on the
        // deadline instead of overshooting by up to a full interval.
        tokio::select! {
            _ = sleep(interval.min(deadline - now)) => {}
            _ = cancel_requested(&mut cancel) => return WatchOutcome::Cancelled,
        }
    }
}
