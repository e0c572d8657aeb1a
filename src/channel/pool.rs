//! Fixed-size channel pool
//!
//! The pool owns `N` channel slots. Picking a free slot happens under one
//! pool-wide mutex; everything else about a slot (whether it is occupied,
//! its queue, its active flag) sits behind the slot's own mutex, so a check
//! and the write that depends on it always happen under the same lock. The
//! two locks are never held at the same time.
//!
//! Every occupation bumps the slot's generation. A [`ChannelClaim`] carries
//! the generation its holder got, so a link that lost its channel cannot
//! touch the channel's next owner.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::queue::{ByteQueue, DEFAULT_QUEUE_CAPACITY};

/// Default number of channels (matches the protocol's comm-buffer count)
pub const DEFAULT_CHANNELS: usize = 4;

/// Counters for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Bytes accepted into the queue
    pub enqueued_bytes: u64,
    /// Bytes taken out of the queue by the owning link
    pub dequeued_bytes: u64,
    /// Bytes rejected because the queue was full
    pub dropped_bytes: u64,
    /// Bytes waiting in the queue right now
    pub queued_bytes: usize,
}

/// One occupation of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClaim {
    index: usize,
    generation: u64,
}

impl ChannelClaim {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Per-channel state guarded by the slot mutex
#[derive(Debug)]
pub(super) struct ChannelSlot {
    pub(super) occupied: bool,
    pub(super) generation: u64,
    pub(super) active: bool,
    pub(super) queue: ByteQueue,
    pub(super) owner: Option<String>,
    pub(super) enqueued_bytes: u64,
    pub(super) dequeued_bytes: u64,
    pub(super) dropped_bytes: u64,
}

impl ChannelSlot {
    fn new(queue_capacity: usize) -> Self {
        Self {
            occupied: false,
            generation: 0,
            active: false,
            queue: ByteQueue::with_capacity(queue_capacity),
            owner: None,
            enqueued_bytes: 0,
            dequeued_bytes: 0,
            dropped_bytes: 0,
        }
    }

    fn is_held_by(&self, claim: &ChannelClaim) -> bool {
        self.occupied && self.generation == claim.generation
    }

    fn reset(&mut self) {
        self.occupied = false;
        self.active = false;
        self.queue.reset();
        self.owner = None;
    }
}

/// Pool of `N` channels shared by every link
///
/// Created once by the composition root and handed to transports, the
/// fan-out path and diagnostics through an `Arc`.
#[derive(Debug)]
pub struct ChannelPool {
    taken: Mutex<Vec<bool>>,
    pub(super) slots: Box<[Mutex<ChannelSlot>]>,
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelPool {
    /// Create a pool with the default channel count and queue capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNELS, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a pool with `channels` slots, each with a `queue_capacity` byte queue
    pub fn with_capacity(channels: usize, queue_capacity: usize) -> Self {
        let slots = (0..channels)
            .map(|_| Mutex::new(ChannelSlot::new(queue_capacity)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            taken: Mutex::new(vec![false; channels]),
            slots,
        }
    }

    /// Number of channels in the pool
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Reserve the lowest free channel
    ///
    /// Returns `None` when every channel is taken; callers must refuse the
    /// new link in that case.
    pub fn occupy(&self) -> Option<usize> {
        self.claim().map(|claim| claim.index)
    }

    /// Reserve the lowest free channel and return the occupation
    pub fn claim(&self) -> Option<ChannelClaim> {
        let mut taken = lock(&self.taken);
        let index = taken.iter().position(|t| !t)?;
        taken[index] = true;
        drop(taken);

        let mut slot = lock(&self.slots[index]);
        slot.occupied = true;
        slot.generation += 1;
        let claim = ChannelClaim {
            index,
            generation: slot.generation,
        };
        drop(slot);

        tracing::debug!(channel = index, generation = claim.generation, "Channel occupied");
        Some(claim)
    }

    /// Free a channel, clearing its queue and active flag
    ///
    /// Releasing a channel that is already free (or out of range) does nothing.
    pub fn release(&self, index: usize) {
        self.free(index, None);
    }

    /// Free a channel only if `claim` is still its current occupation
    ///
    /// Returns `true` if the channel was freed.
    pub fn release_claim(&self, claim: &ChannelClaim) -> bool {
        self.free(claim.index, Some(claim.generation))
    }

    fn free(&self, index: usize, generation: Option<u64>) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };

        let mut slot = lock(slot);
        if !slot.occupied || generation.is_some_and(|g| g != slot.generation) {
            return false;
        }
        // Cleared before the index becomes pickable again
        slot.reset();
        drop(slot);

        lock(&self.taken)[index] = false;
        tracing::debug!(channel = index, "Channel released");
        true
    }

    /// Whether `index` is currently reserved
    pub fn is_occupied(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|slot| lock(slot).occupied)
            .unwrap_or(false)
    }

    /// Whether `claim` is still the current occupation of its channel
    pub fn holds(&self, claim: &ChannelClaim) -> bool {
        self.slots
            .get(claim.index)
            .map(|slot| lock(slot).is_held_by(claim))
            .unwrap_or(false)
    }

    /// Number of reserved channels
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| lock(slot).occupied).count()
    }

    /// Record which link owns a channel (diagnostics only)
    pub fn set_owner(&self, index: usize, owner: impl Into<String>) {
        if let Some(slot) = self.slots.get(index) {
            let mut slot = lock(slot);
            if slot.occupied {
                slot.owner = Some(owner.into());
            }
        }
    }

    /// Name of the link owning a channel, if any
    pub fn owner(&self, index: usize) -> Option<String> {
        self.slots.get(index).and_then(|slot| lock(slot).owner.clone())
    }

    /// Set whether a channel receives fan-out
    ///
    /// Returns `true` if the flag changed. Free channels cannot be activated.
    pub fn set_active(&self, index: usize, active: bool) -> bool {
        match self.slots.get(index) {
            Some(slot) => {
                let mut slot = lock(slot);
                if active && !slot.occupied {
                    return false;
                }
                let changed = slot.active != active;
                slot.active = active;
                changed
            }
            None => false,
        }
    }

    /// Like [`set_active`](Self::set_active), but only while `claim` holds the channel
    pub fn set_claim_active(&self, claim: &ChannelClaim, active: bool) -> bool {
        match self.slots.get(claim.index) {
            Some(slot) => {
                let mut slot = lock(slot);
                if !slot.is_held_by(claim) {
                    return false;
                }
                let changed = slot.active != active;
                slot.active = active;
                changed
            }
            None => false,
        }
    }

    /// Whether a channel currently receives fan-out
    pub fn is_active(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|slot| lock(slot).active)
            .unwrap_or(false)
    }

    /// Whether a channel has bytes waiting to be written
    pub fn has_pending(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .map(|slot| !lock(slot).queue.is_empty())
            .unwrap_or(false)
    }

    /// Pop up to `out.len()` pending bytes from a channel's queue
    pub fn drain(&self, index: usize, out: &mut [u8]) -> usize {
        match self.slots.get(index) {
            Some(slot) => {
                let mut slot = lock(slot);
                let n = slot.queue.pop(out);
                slot.dequeued_bytes += n as u64;
                n
            }
            None => 0,
        }
    }

    /// Counters for a channel
    pub fn stats(&self, index: usize) -> Option<ChannelStats> {
        self.slots.get(index).map(|slot| {
            let slot = lock(slot);
            ChannelStats {
                enqueued_bytes: slot.enqueued_bytes,
                dequeued_bytes: slot.dequeued_bytes,
                dropped_bytes: slot.dropped_bytes,
                queued_bytes: slot.queue.len(),
            }
        })
    }
}

impl Default for ChannelPool {
    fn default() -> Self {
        Self::new()
    }
}
