//! Double-buffered inbound queue drained a bounded amount per tick.
//!
//! ```text
//!  I/O tasks ──enqueue──→ Inbox (back, locked) ──swap on tick──→ front
//!      ↑                        ↑                                  │
//!   acquire ── spare list ←─refill── EnvelopePool ←─release── route ←┘
//! ```
//!
//! The back queue and its spare list are the only state shared with the
//! I/O side; the front queue and the pool belong to whoever calls
//! [`Dispatcher::tick`].
//!
//! ## Envelope recycling
//!
//! The pool itself is never touched by the I/O side. Instead, while the
//! tick already holds the inbox lock for the swap, it moves idle
//! envelopes out of the pool into the inbox's spare list. The I/O side
//! decodes each frame into an envelope taken from that list and only
//! allocates when the list runs dry. After a burst has gone round once,
//! the same envelopes keep circulating and inbound traffic stops
//! allocating.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gamelink_protocol::{EnvelopePool, MessageEnvelope};
use tracing::{trace, warn};

use crate::HandlerRegistry;

/// Default number of envelopes routed per tick.
pub const MAX_PER_TICK: usize = 16;

/// Idle envelopes the pool keeps back from the spare list for outbound
/// sends.
const OUTBOUND_RESERVE: usize = 1;

#[derive(Debug, Default)]
struct Queues {
    back: VecDeque<MessageEnvelope>,
    spare: Vec<MessageEnvelope>,
    allocated: usize,
}

/// Producer side of a [`Dispatcher`]: the locked back queue.
///
/// Cheap to clone; every clone feeds the same dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    queues: Arc<Mutex<Queues>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an envelope. Safe to call from any thread.
    pub fn enqueue(&self, envelope: MessageEnvelope) {
        self.lock().back.push_back(envelope);
    }

    /// Takes a cleared envelope to decode into, recycled if one is spare.
    pub fn acquire(&self) -> MessageEnvelope {
        let mut queues = self.lock();
        match queues.spare.pop() {
            Some(envelope) => envelope,
            None => {
                queues.allocated += 1;
                MessageEnvelope::default()
            }
        }
    }

    /// Gives back an envelope that was acquired but never enqueued, e.g.
    /// because its frame failed to decode.
    pub fn recycle(&self, mut envelope: MessageEnvelope) {
        envelope.clear();
        self.lock().spare.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.lock().back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().back.is_empty()
    }

    /// Envelopes waiting in the spare list.
    pub fn spare(&self) -> usize {
        self.lock().spare.len()
    }

    /// Envelopes [`acquire`](Self::acquire) has had to allocate because
    /// the spare list was empty.
    pub fn allocated(&self) -> usize {
        self.lock().allocated
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where the dispatcher sends each envelope it drains.
///
/// [`HandlerRegistry`] is the usual router. The session wraps it to
/// intercept its own reserved opcodes first.
pub trait Route {
    fn route(&mut self, envelope: &MessageEnvelope);
}

impl Route for HandlerRegistry {
    fn route(&mut self, envelope: &MessageEnvelope) {
        self.dispatch(envelope.opcode, &envelope.payload);
    }
}

impl<F> Route for F
where
    F: FnMut(&MessageEnvelope),
{
    fn route(&mut self, envelope: &MessageEnvelope) {
        self(envelope)
    }
}

/// Consumer side: owns the front queue and the envelope pool.
#[derive(Debug)]
pub struct Dispatcher {
    inbox: Inbox,
    front: VecDeque<MessageEnvelope>,
    pool: EnvelopePool,
    max_per_tick: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(MAX_PER_TICK, EnvelopePool::default())
    }
}

impl Dispatcher {
    /// Creates a dispatcher routing at most `max_per_tick` envelopes per
    /// tick. Zero is raised to one.
    pub fn new(max_per_tick: usize, pool: EnvelopePool) -> Self {
        let max_per_tick = if max_per_tick == 0 {
            warn!("max_per_tick of 0 would never drain, using 1");
            1
        } else {
            max_per_tick
        };
        Self {
            inbox: Inbox::new(),
            front: VecDeque::new(),
            pool,
            max_per_tick,
        }
    }

    /// A producer handle for the transport's message callback.
    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    pub fn enqueue(&self, envelope: MessageEnvelope) {
        self.inbox.enqueue(envelope);
    }

    /// Moves newly arrived envelopes to the front queue, then routes up to
    /// `max_per_tick` of them in arrival order. Each routed envelope goes
    /// back to the pool. Returns how many were routed.
    ///
    /// Anything beyond the budget stays queued for the next tick.
    ///
    /// # Swap or append
    ///
    /// When the front queue is empty the two queues are swapped, which is
    /// O(1) and hands the I/O side the front's already grown buffer to
    /// fill next. When envelopes are left over from the last tick they
    /// must run before anything newer, so the back queue is appended
    /// behind them instead. Either way the lock is held once per tick and
    /// arrival order is preserved across the boundary.
    pub fn tick<R: Route + ?Sized>(&mut self, router: &mut R) -> usize {
        {
            let mut queues = self.inbox.lock();
            if self.front.is_empty() {
                mem::swap(&mut self.front, &mut queues.back);
            } else {
                self.front.append(&mut queues.back);
            }
            let room = self.pool.max_idle().saturating_sub(queues.spare.len());
            let spare = self.pool.idle().saturating_sub(OUTBOUND_RESERVE).min(room);
            for _ in 0..spare {
                let Some(envelope) = self.pool.take_idle() else {
                    break;
                };
                queues.spare.push(envelope);
            }
        }

        let mut routed = 0;
        while routed < self.max_per_tick {
            let Some(envelope) = self.front.pop_front() else {
                break;
            };
            router.route(&envelope);
            self.pool.release(envelope);
            routed += 1;
        }

        if !self.front.is_empty() {
            trace!(routed, remaining = self.front.len(), "tick budget reached");
        }
        routed
    }

    /// Envelopes waiting in either queue.
    pub fn pending(&self) -> usize {
        self.front.len() + self.inbox.len()
    }

    /// Envelopes allocated so far on either side: by the pool for sends
    /// and routing, and by the inbox when its spare list ran dry.
    pub fn allocated(&self) -> usize {
        self.pool.allocated() + self.inbox.allocated()
    }

    pub fn max_per_tick(&self) -> usize {
        self.max_per_tick
    }

    /// Takes an envelope from the pool, e.g. to build an outbound message.
    pub fn acquire(&mut self) -> MessageEnvelope {
        self.pool.acquire()
    }

    pub fn release(&mut self, envelope: MessageEnvelope) {
        self.pool.release(envelope);
    }

    pub fn pool(&self) -> &EnvelopePool {
        &self.pool
    }
}
