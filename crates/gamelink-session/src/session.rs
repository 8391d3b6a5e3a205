//! The session facade: one object for connect, send, tick, disconnect.
//!
//! ```text
//!             ┌────────────────────── Session ───────────────────────┐
//! connect() ─→│ Transport ──on_message──→ Inbox ─┐                   │
//! send()    ─→│     ↑  (I/O tasks)               │ tick()            │
//!             │     │                            ↓                   │
//!             │     └──reconnect── Heartbeat ← Dispatcher → Registry │
//!             └──────────────────────────────────────────────────────┘
//! ```
//!
//! Everything except the inbox and the transport's own state is touched
//! only from the thread that calls [`Session::tick`].

use std::sync::Arc;

use gamelink_dispatch::{Dispatcher, HandlerError, HandlerId, HandlerRegistry, Inbox, Route};
use gamelink_protocol::{
    Codec, EnvelopePool, HeartbeatAck, JsonCodec, MessageCodec, MessageEnvelope, Opcode,
};
use gamelink_transport::{
    ConnectionState, Connector, Endpoint, Transport, TransportError, TransportEvent,
    TransportListener,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{HeartbeatMonitor, Recovery, SessionConfig, SessionError};

/// Connectivity changes published to the rest of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected { reason: Option<String> },
    /// Every connect attempt failed. The session stays down until
    /// [`Session::connect`] is called again.
    ConnectExhausted { attempts: u32 },
}

/// A client session with a game server.
///
/// Drive it by calling [`tick`](Self::tick) once per frame of the
/// program's loop. Inbound messages are only handled during `tick`, and
/// the heartbeat only runs there.
pub struct Session<C: Connector, K: Codec = JsonCodec> {
    transport: Transport<C>,
    transport_events: broadcast::Receiver<TransportEvent>,
    dispatcher: Dispatcher,
    registry: HandlerRegistry,
    heartbeat: HeartbeatMonitor,
    codec: K,
    frames: MessageCodec,
    routing_id: String,
    events: broadcast::Sender<SessionEvent>,
}

impl<C: Connector, K: Codec + Clone> Session<C, K> {
    /// Builds a disconnected session. Nothing is dialled until
    /// [`connect`](Self::connect).
    pub fn new(connector: C, endpoint: Endpoint, config: SessionConfig, codec: K) -> Self {
        let config = config.validated();
        let frames = MessageCodec::new(config.max_frame_len);
        let dispatcher = Dispatcher::new(
            config.max_per_tick,
            EnvelopePool::new(config.pool_capacity),
        );
        let listener = Arc::new(InboundListener {
            inbox: dispatcher.inbox(),
            frames,
        });
        let transport = Transport::new(connector, endpoint, config.transport.clone(), listener);
        let transport_events = transport.subscribe();
        let (events, _) = broadcast::channel(config.transport.event_capacity);

        Self {
            transport,
            transport_events,
            dispatcher,
            registry: HandlerRegistry::new(),
            heartbeat: HeartbeatMonitor::new(config.heartbeat, Instant::now()),
            codec,
            frames,
            routing_id: config.routing_id,
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Connection control
    // -----------------------------------------------------------------------

    /// Starts connecting and arms the heartbeat. Resets an exhausted retry
    /// budget. Returns `None` if already open or connecting.
    ///
    /// Calling this while already open or connecting is a no-op: the
    /// staleness clock keeps running, so polling `connect()` every frame
    /// does not hide a silent peer.
    pub fn connect(&mut self) -> Option<u64> {
        let started = self.transport.connect_async();
        self.arm_heartbeat(started.is_some());
        started
    }

    /// Drops the current connection, if any, and dials again.
    pub fn reconnect(&mut self) -> Option<u64> {
        let started = self.transport.reconnect();
        self.arm_heartbeat(started.is_some());
        started
    }

    /// Restarts the staleness clock only for a fresh attempt, or when the
    /// monitor was disarmed.
    fn arm_heartbeat(&mut self, started: bool) {
        if started || !self.heartbeat.is_armed() {
            self.heartbeat.arm(Instant::now());
        }
    }

    /// Closes the connection and disarms the heartbeat so the session
    /// stays down.
    pub fn disconnect(&mut self) {
        self.heartbeat.disarm();
        self.transport.disconnect();
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Encodes `message` and sends it. Returns `false` and logs if the
    /// connection is not open or encoding fails. Never queued for later.
    pub fn send<T: Serialize>(&mut self, opcode: Opcode, message: &T) -> bool {
        match self.try_send(opcode, message) {
            Ok(()) => true,
            Err(e) => {
                warn!(%opcode, error = %e, "dropping outbound message");
                false
            }
        }
    }

    /// Like [`send`](Self::send) but reports why nothing was sent.
    pub fn try_send<T: Serialize>(&mut self, opcode: Opcode, message: &T) -> Result<(), SessionError> {
        self.ensure_open()?;

        let mut envelope = self.dispatcher.acquire();
        envelope.opcode = opcode;
        envelope.routing_id.push_str(&self.routing_id);
        let framed = self
            .codec
            .encode_into(message, &mut envelope.payload)
            .and_then(|()| self.frames.encode_envelope(&envelope));
        self.dispatcher.release(envelope);

        self.transport.try_send(framed?)?;
        Ok(())
    }

    /// Sends already-encoded payload bytes, bypassing the codec.
    pub fn send_raw(&mut self, opcode: Opcode, payload: &[u8]) -> bool {
        match self.try_send_raw(opcode, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!(%opcode, error = %e, "dropping outbound message");
                false
            }
        }
    }

    pub fn try_send_raw(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), SessionError> {
        self.ensure_open()?;
        let framed = self.frames.encode(opcode, &self.routing_id, payload)?;
        self.transport.try_send(framed)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        match self.transport.state() {
            ConnectionState::Open => Ok(()),
            state => Err(TransportError::SendRejected { state }),
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// Registers a handler over the raw payload bytes of `opcode`.
    pub fn register_handler<F>(&mut self, opcode: Opcode, handler: F) -> HandlerId
    where
        F: Fn(&[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        warn_if_reserved(opcode);
        self.registry.register_fn(opcode, handler)
    }

    /// Registers a handler that receives the payload decoded with the
    /// session codec.
    pub fn on<T, F>(&mut self, opcode: Opcode, handler: F) -> HandlerId
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        warn_if_reserved(opcode);
        self.registry
            .register_typed(opcode, self.codec.clone(), handler)
    }

    pub fn unregister_handler(&mut self, opcode: Opcode, id: HandlerId) -> bool {
        self.registry.unregister(opcode, id)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Runs one cycle: publishes connectivity changes, routes up to
    /// `max_per_tick` inbound messages, then lets the heartbeat probe or
    /// recover the connection. Returns how many messages were routed.
    ///
    /// Never blocks and never propagates handler failures.
    pub fn tick(&mut self) -> usize {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit clock reading.
    pub fn tick_at(&mut self, now: Instant) -> usize {
        self.drain_transport_events(now);

        let mut router = SessionRouter {
            registry: &self.registry,
            heartbeat: &mut self.heartbeat,
            codec: &self.codec,
            now,
        };
        let routed = self.dispatcher.tick(&mut router);

        let decision = self.heartbeat.on_tick(now, self.transport.state());
        if let Some(probe) = decision.probe {
            if let Err(e) = self.try_send(Opcode::HEARTBEAT_REQUEST, &probe) {
                debug!(error = %e, "heartbeat probe not sent");
            }
        }
        match decision.recovery {
            Some(Recovery::Reconnect) => {
                self.reconnect();
            }
            Some(Recovery::Connect) => {
                self.connect();
            }
            None => {}
        }
        routed
    }

    fn drain_transport_events(&mut self, now: Instant) {
        loop {
            match self.transport_events.try_recv() {
                Ok(event) => self.on_transport_event(event, now),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "transport events lagged, resyncing from state");
                    if self.transport.state().is_open() {
                        self.heartbeat.reset(now);
                    } else if self.transport.is_exhausted() {
                        self.heartbeat.disarm();
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent, now: Instant) {
        let published = match event {
            TransportEvent::Connected { generation } => {
                info!(generation, "session connected");
                self.heartbeat.reset(now);
                SessionEvent::Connected
            }
            TransportEvent::Disconnected { generation, reason } => {
                info!(generation, reason = reason.as_deref().unwrap_or("local"), "session disconnected");
                SessionEvent::Disconnected { reason }
            }
            TransportEvent::ConnectExhausted { attempts } => {
                warn!(attempts, "session gave up connecting");
                self.heartbeat.disarm();
                SessionEvent::ConnectExhausted { attempts }
            }
            other => {
                trace!(event = ?other, "transport event");
                return;
            }
        };
        // Having no subscribers is not an error.
        let _ = self.events.send(published);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Inbound messages waiting for a tick.
    pub fn pending(&self) -> usize {
        self.dispatcher.pending()
    }

    /// Envelopes allocated so far for sending and receiving. Stops
    /// growing once traffic settles, as envelopes are recycled.
    pub fn allocated_envelopes(&self) -> usize {
        self.dispatcher.allocated()
    }

    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    pub fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    pub fn codec(&self) -> &K {
        &self.codec
    }

    pub fn routing_id(&self) -> &str {
        &self.routing_id
    }

    /// Changes the routing hint stamped on subsequent sends.
    pub fn set_routing_id(&mut self, routing_id: impl Into<String>) {
        self.routing_id = routing_id.into();
    }
}

fn warn_if_reserved(opcode: Opcode) {
    if opcode.is_reserved() {
        warn!(%opcode, "opcode is reserved for heartbeats; handler will never run");
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Consumes heartbeat opcodes itself and hands the rest to the registry.
struct SessionRouter<'a, K> {
    registry: &'a HandlerRegistry,
    heartbeat: &'a mut HeartbeatMonitor,
    codec: &'a K,
    now: Instant,
}

impl<K: Codec> Route for SessionRouter<'_, K> {
    fn route(&mut self, envelope: &MessageEnvelope) {
        match envelope.opcode {
            Opcode::HEARTBEAT_RESPONSE => {
                match self.codec.decode::<HeartbeatAck>(&envelope.payload) {
                    Ok(ack) => self.heartbeat.on_ack(self.now, ack),
                    Err(e) => warn!(error = %e, "malformed heartbeat acknowledgment"),
                }
            }
            Opcode::HEARTBEAT_REQUEST => {
                debug!("ignoring heartbeat request from server");
            }
            opcode => {
                self.registry.dispatch(opcode, &envelope.payload);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Runs on the transport's reader task: unframes each message into
/// recycled envelopes and queues them for the next tick.
struct InboundListener {
    inbox: Inbox,
    frames: MessageCodec,
}

impl TransportListener for InboundListener {
    fn on_message(&self, data: Vec<u8>) {
        let mut frames = self.frames.decode_all(&data);
        while !frames.is_empty() {
            let mut envelope = self.inbox.acquire();
            match frames.next_into(&mut envelope) {
                Some(Ok(())) => self.inbox.enqueue(envelope),
                Some(Err(e)) => {
                    warn!(error = %e, len = data.len(), "dropping undecodable frame");
                    self.inbox.recycle(envelope);
                }
                None => self.inbox.recycle(envelope),
            }
        }
    }

    fn on_error(&self, error: &TransportError) {
        debug!(error = %error, "transport error");
    }
}
