//! Term register -- a monotonic, lock-free logical clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A Raft term number.
pub type Term = u64;

/// Monotonically non-decreasing term counter, safe to read and update
/// concurrently from any number of tasks. Cloning shares the same
/// underlying counter (it wraps an `Arc`), which is how the driver's
/// heartbeat-round task and the actor loop both observe the same term
/// without routing every update through the actor.
#[derive(Debug, Clone, Default)]
pub struct TermRegister {
    inner: Arc<AtomicU64>,
}

impl TermRegister {
    pub fn new(initial: Term) -> Self {
        TermRegister { inner: Arc::new(AtomicU64::new(initial)) }
    }

    /// Reads the current term.
    pub fn current(&self) -> Term {
        self.inner.load(Ordering::SeqCst)
    }

    /// Atomically increments the term and returns the new value.
    pub fn next(&self) -> Term {
        self.inner.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// If `t` is greater than the current term, advances to `t`.
    /// Idempotent and a no-op if `t` does not exceed the current term.
    /// Returns the term in effect after the call (`max(prev, t)`).
    pub fn update_to(&self, t: Term) -> Term {
        let mut current = self.inner.load(Ordering::SeqCst);
        loop {
            if t <= current {
                return current;
            }
            match self.inner.compare_exchange_weak(
                current,
                t,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return t,
                Err(observed) => current = observed,
            }
        }
    }

    /// `current() < t`.
    pub fn is_before(&self, t: Term) -> bool {
        self.current() < t
    }
}
