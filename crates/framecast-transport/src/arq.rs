//! # ARQ — gap-driven retransmission queues
//!
//! Two queue variants back the loss-recovery loop:
//!
//! - [`RequestQueue`] (client side): FIFO of sequence numbers the client is
//!   missing, drained one request per drip tick so recovery traffic never
//!   bursts into a self-inflicted loss spike.
//! - [`ResendBacklog`] (server side): fixed-capacity ring of sequence numbers
//!   to resend, consumed with priority by the pacing loop. Overflow drops the
//!   tail of the offending gap and logs it — recovery degrades, never faults.

use std::collections::VecDeque;

// ─── Request Queue (Client-Side) ────────────────────────────────────────────

/// FIFO of sequence numbers awaiting a retransmission request.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<u32>,
}

impl RequestQueue {
    pub fn new() -> Self {
        RequestQueue {
            pending: VecDeque::new(),
        }
    }

    /// Queue every sequence number in `[low, high)`, in increasing order.
    pub fn enqueue_range(&mut self, low: u32, high: u32) {
        for seq in low..high {
            self.pending.push_back(seq);
        }
    }

    /// Pop the oldest pending sequence number.
    pub fn dequeue(&mut self) -> Option<u32> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Pending sequence numbers in request order.
    pub fn pending(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending.iter().copied()
    }
}

// ─── Resend Backlog (Server-Side) ───────────────────────────────────────────

/// Bounded ring of sequence numbers the server owes a resend.
///
/// Capacity is fixed at construction. A gap that would overflow the ring has
/// its remaining entries dropped: the affected client shows truncated frames
/// rather than stalling the whole session.
#[derive(Debug)]
pub struct ResendBacklog {
    slots: VecDeque<u32>,
    capacity: usize,
    dropped: u64,
}

impl ResendBacklog {
    pub fn new(capacity: usize) -> Self {
        ResendBacklog {
            slots: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queue `[low, high)` for resend, in increasing order. Returns how many
    /// entries were accepted; the rest of the range is dropped and counted.
    pub fn enqueue_range(&mut self, low: u32, high: u32) -> usize {
        let mut accepted = 0;
        for seq in low..high {
            if self.slots.len() == self.capacity {
                let lost = (high - seq) as u64;
                self.dropped += lost;
                tracing::warn!(low, high, lost, "resend backlog full, dropping tail of gap");
                break;
            }
            self.slots.push_back(seq);
            accepted += 1;
        }
        accepted
    }

    /// Pop the oldest owed sequence number.
    pub fn dequeue(&mut self) -> Option<u32> {
        self.slots.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries dropped to overflow since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
