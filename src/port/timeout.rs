//! # Operation Deadlines
//!
//! Blocking port operations are bounded by a caller-configured timeout
//! (zero meaning "block indefinitely"). A [`Deadline`] is created once per
//! operation from that timeout and checked cooperatively at each iteration
//! of a polling loop, or converted into the bound for a single waiting
//! system call. There is no retry after expiry: the operation fails with
//! the timeout error and the caller decides what to do next.

use std::time::{Duration, Instant};

/// A per-operation expiry point.
///
/// Built from the operation's configured timeout; `Duration::ZERO` produces
/// a deadline that never expires.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now. Zero means no deadline.
    pub fn after(timeout: Duration) -> Self {
        let expires_at = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        Self { expires_at }
    }

    /// Has the deadline passed?
    pub fn expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry. `None` when unbounded; `Some(ZERO)` when
    /// already expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}
