//! Process-wide count of live links
//!
//! The flight-control failsafe reads this to decide whether any ground
//! station is still connected.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of links currently past their first heartbeat and not yet timed out
///
/// Each link changes the count by exactly one on each liveness transition.
#[derive(Debug, Default)]
pub struct ActiveLinkCounter {
    count: AtomicUsize,
}

impl ActiveLinkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link becoming active, returning the new count
    pub fn increment(&self) -> usize {
        let now = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(active = now, "Link active");
        now
    }

    /// Record a link going inactive, returning the new count
    ///
    /// Never goes below zero.
    pub fn decrement(&self) -> usize {
        let prev = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        if prev == 0 {
            tracing::warn!("Active link counter decremented at zero");
        }
        let now = prev.saturating_sub(1);
        tracing::debug!(active = now, "Link inactive");
        now
    }

    /// Current number of active links
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}
