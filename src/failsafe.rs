//! Ground-link failsafe
//!
//! Polled by the control loop. While the vehicle is armed and no link is
//! active, it asks for a disarm exactly once; seeing a link again re-arms
//! the trigger.

use std::sync::Arc;

use crate::link::ActiveLinkCounter;

/// What the control loop should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailsafeAction {
    None,
    Disarm,
}

/// Edge-triggered "no ground link" detector
#[derive(Debug)]
pub struct LinkFailsafe {
    counter: Arc<ActiveLinkCounter>,
    tripped: bool,
}

impl LinkFailsafe {
    pub fn new(counter: Arc<ActiveLinkCounter>) -> Self {
        Self {
            counter,
            tripped: false,
        }
    }

    /// Check the link count for a vehicle that is `armed`
    pub fn check(&mut self, armed: bool) -> FailsafeAction {
        if self.counter.get() > 0 {
            self.tripped = false;
            return FailsafeAction::None;
        }
        if !armed || self.tripped {
            return FailsafeAction::None;
        }

        self.tripped = true;
        tracing::warn!("No active ground link while armed, disarming");
        FailsafeAction::Disarm
    }
}
