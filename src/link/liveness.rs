//! Heartbeat liveness tracking
//!
//! A link is active from its first heartbeat until no heartbeat has been
//! seen for longer than the timeout. The tracker only reports transitions;
//! the connection applies their side effects.

use std::time::Duration;

use tokio::time::Instant;

/// Default heartbeat timeout
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of feeding the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Nothing changed
    Unchanged,
    /// First heartbeat after being inactive
    Activated,
    /// Deadline passed while active
    Deactivated,
    /// Deadline passed while already inactive
    Expired,
}

/// Liveness deadline for one link
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    timeout: Duration,
    deadline: Instant,
    active: bool,
}

impl LivenessTracker {
    /// Create a tracker whose first deadline is `started_at + timeout`
    pub fn new(timeout: Duration, started_at: Instant) -> Self {
        Self {
            timeout,
            deadline: started_at + timeout,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Record a heartbeat seen at `now`
    pub fn on_heartbeat(&mut self, now: Instant) -> Liveness {
        self.deadline = now + self.timeout;
        if self.active {
            Liveness::Unchanged
        } else {
            self.active = true;
            Liveness::Activated
        }
    }

    /// Check the deadline at `now`
    ///
    /// The deadline itself is still alive; only a strictly later instant
    /// expires it.
    pub fn poll(&mut self, now: Instant) -> Liveness {
        if now <= self.deadline {
            return Liveness::Unchanged;
        }
        if self.active {
            self.active = false;
            Liveness::Deactivated
        } else {
            Liveness::Expired
        }
    }
}
