//! Reusable pool of [`MessageEnvelope`]s.
//!
//! The pool is single-owner: only the tick thread touches it, so it needs
//! no locking. Acquire and release are both O(1) pushes and pops on a
//! `Vec`.

use crate::MessageEnvelope;

/// A free list of cleared envelopes.
///
/// `acquire` on an empty pool allocates a fresh envelope. `release`
/// clears the envelope and keeps it for reuse, up to `max_idle`; past
/// that the envelope is dropped, so a burst of inbound traffic cannot pin
/// memory forever. The pool never shrinks below what it holds.
#[derive(Debug)]
pub struct EnvelopePool {
    idle: Vec<MessageEnvelope>,
    max_idle: usize,
    allocated: usize,
}

impl Default for EnvelopePool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_IDLE)
    }
}

impl EnvelopePool {
    /// Default number of idle envelopes retained.
    pub const DEFAULT_MAX_IDLE: usize = 256;

    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Vec::new(),
            max_idle,
            allocated: 0,
        }
    }

    /// Takes an empty envelope out of the pool.
    pub fn acquire(&mut self) -> MessageEnvelope {
        match self.idle.pop() {
            Some(envelope) => envelope,
            None => {
                self.allocated += 1;
                MessageEnvelope::default()
            }
        }
    }

    /// Takes an idle envelope without ever allocating.
    pub fn take_idle(&mut self) -> Option<MessageEnvelope> {
        self.idle.pop()
    }

    /// Returns an envelope to the pool.
    ///
    /// The caller gives up ownership, so no two users can ever hold the
    /// same instance.
    pub fn release(&mut self, mut envelope: MessageEnvelope) {
        if self.idle.len() < self.max_idle {
            envelope.clear();
            self.idle.push(envelope);
        }
    }

    /// Number of envelopes currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Total envelopes the pool has had to allocate.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    pub fn max_idle(&self) -> usize {
        self.max_idle
    }
}
