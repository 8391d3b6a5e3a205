//! The connection-owning state machine and its connect watchdog.
//!
//! # Generations
//!
//! Every connect attempt and every disconnect bumps a generation counter.
//! Anything that completes later (the connect future, the watchdog timer,
//! a delayed retry, a link's reader or writer) carries the generation it
//! was started under and checks it against the current one before
//! touching state. A mismatch means the work was superseded and it does
//! nothing, so overlapping attempts can never clobber each other.
//!
//! A single boolean "did a result arrive yet" flag cannot tell two
//! attempts apart. With a counter, this sequence is harmless:
//!
//! ```text
//! t=0s   connect_async      generation 1, watchdog(1) due at t=5s
//! t=2s   reconnect          teardown takes 2, new attempt 3,
//!                           watchdog(3) due at t=7s
//! t=2s   attempt 3 opens    generation 3 resolved
//! t=5s   watchdog(1) fires  1 != 3, no-op
//! t=7s   watchdog(3) fires  resolved, no-op
//! ```
//!
//! A link produced by an attempt that was superseded while its connect
//! future was still running is closed on arrival instead of replacing the
//! current one.
//!
//! # Tasks
//!
//! ```text
//! connect_async ──spawn──→ connect task ──ok──→ writer task (mpsc → link.send)
//!       │                       │                reader task (link.recv → on_message)
//!       └──spawn──→ watchdog    └─err──→ retry after retry_delay
//!                  (sleep, then retry or exhaust)
//! ```
//!
//! The generation counter, the state, and the active link live behind one
//! `std::sync::Mutex`. It is never held across an await or while a
//! listener callback runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    ConnectAttempt, ConnectionState, Connector, Endpoint, Link, TransportConfig, TransportError,
    TransportEvent, TransportListener,
};

/// Owns one physical connection at a time.
///
/// `send` and the state accessors are synchronous and never block on I/O.
/// `connect_async` and `reconnect` spawn tasks, so they must be called
/// from within a Tokio runtime.
///
/// Dropping the transport disconnects it.
pub struct Transport<C: Connector> {
    shared: Arc<Shared<C>>,
}

struct Shared<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    config: TransportConfig,
    listener: Arc<dyn TransportListener>,
    events: broadcast::Sender<TransportEvent>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    attempt: ConnectAttempt,
    /// An open or error callback has fired for `attempt.generation`.
    resolved: bool,
    exhausted: bool,
    /// Generation of the link being shut down while `Closing`.
    closing: Option<u64>,
    /// The in-flight connect future, aborted when superseded.
    pending: Option<AbortHandle>,
    link: Option<LinkHandle>,
}

/// The transport's grip on an open link. Dropping it lets the writer
/// flush and close, and stops the reader.
struct LinkHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    _stop: oneshot::Sender<()>,
}

enum AfterFailure {
    Retry(u64),
    Exhausted(u32),
}

impl<C: Connector> Transport<C> {
    pub fn new(
        connector: C,
        endpoint: Endpoint,
        config: TransportConfig,
        listener: Arc<dyn TransportListener>,
    ) -> Self {
        let config = config.validated();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                connector,
                endpoint,
                config,
                listener,
                events,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Starts a connect attempt with a fresh retry budget.
    ///
    /// Returns the attempt's generation, or `None` if the connection is
    /// already open or an attempt is already in flight.
    pub fn connect_async(&self) -> Option<u64> {
        self.shared.connect_fresh()
    }

    /// Tears down any connection and starts a fresh attempt.
    pub fn reconnect(&self) -> Option<u64> {
        self.shared.disconnect();
        self.shared.connect_fresh()
    }

    /// Closes the connection and cancels any in-flight attempt.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Queues `data` for the writer task. Returns `false` (and logs) if
    /// the connection is not open; nothing is queued in that case.
    pub fn send(&self, data: Vec<u8>) -> bool {
        match self.try_send(data) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "dropping outbound message");
                false
            }
        }
    }

    /// Like [`send`](Self::send) but reports why the send was refused.
    pub fn try_send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let inner = self.shared.lock();
        match (inner.state, inner.link.as_ref()) {
            (ConnectionState::Open, Some(link)) => link
                .outbound
                .send(data)
                .map_err(|_| TransportError::ConnectionClosed("writer task has stopped".into())),
            (state, _) => Err(TransportError::SendRejected { state }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Snapshot of the current attempt's bookkeeping.
    pub fn attempt(&self) -> ConnectAttempt {
        self.shared.lock().attempt
    }

    /// `true` once the retry budget ran out, until the next explicit
    /// connect or disconnect.
    pub fn is_exhausted(&self) -> bool {
        self.shared.lock().exhausted
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }
}

impl<C: Connector> Drop for Transport<C> {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

impl<C: Connector> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransportEvent) {
        // Having no subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn connect_fresh(self: &Arc<Self>) -> Option<u64> {
        let (generation, closed) = {
            let mut inner = self.lock();
            if matches!(
                inner.state,
                ConnectionState::Open | ConnectionState::Connecting
            ) {
                debug!(state = %inner.state, "connect ignored: connection already live");
                return None;
            }

            // A link still shutting down is finished as far as callers are
            // concerned; its late close callback will find a newer state.
            let closed = inner.closing.take();
            if let Some(link_generation) = closed {
                inner.state = ConnectionState::Disconnected;
                self.emit(TransportEvent::Disconnected {
                    generation: link_generation,
                    reason: Some("disconnect requested".into()),
                });
            }

            inner.attempt.retries_used = 0;
            inner.exhausted = false;
            (self.start_attempt(&mut inner), closed)
        };
        if closed.is_some() {
            self.listener.on_close(Some("disconnect requested"));
        }
        Some(generation)
    }

    /// Begins a new attempt under the lock: bumps the generation, spawns
    /// the connect task and its watchdog.
    fn start_attempt(self: &Arc<Self>, inner: &mut Inner) -> u64 {
        if let Some(previous) = inner.pending.take() {
            previous.abort();
        }
        inner.attempt.generation += 1;
        inner.attempt.deadline = Some(Instant::now() + self.config.connect_timeout);
        inner.resolved = false;
        inner.state = ConnectionState::Connecting;

        let generation = inner.attempt.generation;
        let attempt = inner.attempt.retries_used + 1;
        debug!(generation, attempt, endpoint = %self.endpoint, "connect attempt started");
        self.emit(TransportEvent::Connecting {
            generation,
            attempt,
        });

        let shared = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = shared.connector.connect(&shared.endpoint).await;
            match result {
                Ok(link) => shared.opened(generation, link),
                Err(e) => shared.failed(generation, e),
            }
        });
        inner.pending = Some(task.abort_handle());

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            time::sleep(shared.config.connect_timeout).await;
            shared.on_deadline(generation);
        });

        generation
    }

    fn opened(self: &Arc<Self>, generation: u64, link: C::Link) {
        let link = Arc::new(link);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut inner = self.lock();
            if inner.attempt.generation != generation || inner.state != ConnectionState::Connecting
            {
                drop(inner);
                debug!(generation, "discarding link from superseded attempt");
                tokio::spawn(async move {
                    let _ = link.close().await;
                });
                return;
            }
            inner.pending = None;
            inner.resolved = true;
            inner.attempt.deadline = None;
            inner.attempt.retries_used = 0;
            inner.state = ConnectionState::Open;
            inner.link = Some(LinkHandle {
                generation,
                outbound: outbound_tx,
                _stop: stop_tx,
            });
            self.emit(TransportEvent::Connected { generation });
        }

        info!(generation, endpoint = %self.endpoint, "connection open");
        tokio::spawn(Arc::clone(self).write_loop(Arc::clone(&link), outbound_rx, generation));
        self.listener.on_open();
        tokio::spawn(Arc::clone(self).read_loop(link, stop_rx, generation));
    }

    fn failed(self: &Arc<Self>, generation: u64, error: TransportError) {
        let next = {
            let mut inner = self.lock();
            if inner.attempt.generation != generation || inner.state != ConnectionState::Connecting
            {
                debug!(generation, error = %error, "ignoring error from superseded attempt");
                return;
            }
            inner.pending = None;
            inner.resolved = true;
            inner.attempt.deadline = None;
            inner.state = ConnectionState::Faulted;
            self.emit(TransportEvent::ConnectFailed {
                generation,
                error: error.to_string(),
            });
            if inner.attempt.retries_used < self.config.max_retries {
                inner.attempt.retries_used += 1;
                AfterFailure::Retry(generation)
            } else {
                AfterFailure::Exhausted(self.exhaust(&mut inner))
            }
        };

        warn!(generation, error = %error, "connect attempt failed");
        self.listener.on_error(&error);
        match next {
            AfterFailure::Retry(failed_generation) => {
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    time::sleep(shared.config.retry_delay).await;
                    shared.retry(failed_generation);
                });
            }
            AfterFailure::Exhausted(attempts) => self.report_exhausted(attempts),
        }
    }

    fn retry(self: &Arc<Self>, failed_generation: u64) {
        let mut inner = self.lock();
        if inner.attempt.generation != failed_generation
            || inner.state != ConnectionState::Faulted
            || inner.exhausted
        {
            trace!(failed_generation, "retry superseded");
            return;
        }
        self.start_attempt(&mut inner);
    }

    fn on_deadline(self: &Arc<Self>, generation: u64) {
        let next = {
            let mut inner = self.lock();
            if inner.attempt.generation != generation || inner.resolved {
                trace!(generation, "watchdog: attempt already resolved");
                return;
            }
            self.emit(TransportEvent::ConnectTimedOut { generation });
            if inner.attempt.retries_used < self.config.max_retries {
                inner.attempt.retries_used += 1;
                AfterFailure::Retry(self.start_attempt(&mut inner))
            } else {
                if let Some(pending) = inner.pending.take() {
                    pending.abort();
                }
                AfterFailure::Exhausted(self.exhaust(&mut inner))
            }
        };

        let timeout = TransportError::ConnectTimeout { generation };
        warn!(
            generation,
            timeout_ms = self.config.connect_timeout.as_millis() as u64,
            "connect attempt timed out"
        );
        self.listener.on_error(&timeout);
        match next {
            AfterFailure::Retry(next_generation) => {
                debug!(generation, next_generation, "retrying after timeout");
            }
            AfterFailure::Exhausted(attempts) => self.report_exhausted(attempts),
        }
    }

    /// Marks the retry budget as spent. Returns the total attempts made.
    fn exhaust(&self, inner: &mut Inner) -> u32 {
        inner.state = ConnectionState::Faulted;
        inner.exhausted = true;
        inner.resolved = true;
        inner.attempt.deadline = None;
        let attempts = inner.attempt.retries_used + 1;
        self.emit(TransportEvent::ConnectExhausted { attempts });
        attempts
    }

    fn report_exhausted(&self, attempts: u32) {
        warn!(attempts, endpoint = %self.endpoint, "connect attempts exhausted");
        self.listener
            .on_error(&TransportError::ConnectExhausted { attempts });
    }

    fn disconnect(&self) {
        let detached = {
            let mut inner = self.lock();
            let previous = inner.attempt.generation;
            inner.attempt.generation += 1;
            inner.attempt.deadline = None;
            inner.resolved = true;
            inner.exhausted = false;
            if let Some(pending) = inner.pending.take() {
                pending.abort();
            }

            match inner.state {
                ConnectionState::Open => match inner.link.take() {
                    Some(link) => {
                        inner.closing = Some(link.generation);
                        inner.state = ConnectionState::Closing;
                        Some(link)
                    }
                    None => {
                        inner.state = ConnectionState::Disconnected;
                        None
                    }
                },
                ConnectionState::Connecting | ConnectionState::Faulted => {
                    inner.state = ConnectionState::Disconnected;
                    self.emit(TransportEvent::Disconnected {
                        generation: previous,
                        reason: Some("disconnect requested".into()),
                    });
                    None
                }
                ConnectionState::Closing | ConnectionState::Disconnected => None,
            }
        };
        if let Some(link) = detached {
            debug!(generation = link.generation, "closing connection");
        }
    }

    /// Called by a link's reader or writer once it has stopped. Moves the
    /// transport to `Disconnected` if that link is still the current one.
    fn finish_close(&self, generation: u64, reason: Option<String>) {
        let detached = {
            let mut inner = self.lock();
            let owns_link = inner
                .link
                .as_ref()
                .is_some_and(|link| link.generation == generation);
            match inner.state {
                ConnectionState::Closing if inner.closing == Some(generation) => {
                    inner.closing = None;
                }
                ConnectionState::Open if owns_link => {}
                _ => return,
            }
            inner.state = ConnectionState::Disconnected;
            self.emit(TransportEvent::Disconnected {
                generation,
                reason: reason.clone(),
            });
            inner.link.take()
        };
        drop(detached);

        info!(
            generation,
            reason = reason.as_deref().unwrap_or("local"),
            "connection closed"
        );
        self.listener.on_close(reason.as_deref());
    }

    async fn write_loop(
        self: Arc<Self>,
        link: Arc<C::Link>,
        mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
        generation: u64,
    ) {
        while let Some(data) = outbound.recv().await {
            if let Err(e) = link.send(data).await {
                warn!(generation, error = %e, "send failed");
                self.listener.on_error(&e);
                let _ = link.close().await;
                self.finish_close(generation, Some(e.to_string()));
                return;
            }
        }

        // The handle was dropped: queued frames are flushed, now close.
        if let Err(e) = link.close().await {
            debug!(generation, error = %e, "close failed");
        }
        self.finish_close(generation, None);
    }

    async fn read_loop(
        self: Arc<Self>,
        link: Arc<C::Link>,
        mut stop: oneshot::Receiver<()>,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                _ = &mut stop => {
                    trace!(generation, "reader stopped");
                    return;
                }
                received = link.recv() => match received {
                    Ok(Some(data)) => self.listener.on_message(data),
                    Ok(None) => {
                        self.finish_close(generation, Some("closed by peer".into()));
                        return;
                    }
                    Err(e) => {
                        warn!(generation, error = %e, "receive failed");
                        self.listener.on_error(&e);
                        self.finish_close(generation, Some(e.to_string()));
                        return;
                    }
                },
            }
        }
    }
}
