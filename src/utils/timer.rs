//! Re-armable timer handle.
//!
//! The election state machine owns exactly one of these for the election
//! timeout and, while leader, a second for the heartbeat-send period.
//! Re-arming overwrites the deadline in place rather than allocating a new
//! timer, per the design guidance to prefer a single reused timer.

use tokio::time::{Duration, Instant};

/// A cancellable deadline. `None` means disarmed: `sleep_until()` on a
/// disarmed timer returns a future that never resolves, so it can be used
/// unconditionally inside a `tokio::select!` arm without an `if` guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct RearmableDeadline {
    deadline: Option<Instant>,
}

impl RearmableDeadline {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms (or re-arms) the timer to fire `dur` from now.
    pub fn rearm(&mut self, dur: Duration) {
        self.deadline = Some(Instant::now() + dur);
    }

    /// Disarms the timer; `sleep_until()` will never resolve until the
    /// next `rearm()`.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Future that resolves at the current deadline, or never if disarmed.
    /// Re-evaluate this call every loop iteration -- it captures the
    /// deadline at call time, so a stale future from a previous iteration
    /// must not be reused across a `rearm()`.
    pub async fn sleep_until(&self) {
        match self.deadline {
            Some(d) => tokio::time::sleep_until(d).await,
            None => std::future::pending::<()>().await,
        }
    }
}
