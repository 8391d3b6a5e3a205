//! Transport layer for Gamelink.
//!
//! [`Transport`] owns at most one physical connection at a time. It runs
//! the connect state machine, guards each attempt with a watchdog timer,
//! and reports what happens through [`TransportListener`] callbacks and a
//! [`TransportEvent`] broadcast.
//!
//! The bytes themselves move over a [`Link`] produced by a [`Connector`]:
//!
//! - [`WebSocketConnector`] — `tokio-tungstenite` client (feature `websocket`)
//! - [`memory::MemoryConnector`] — in-process loopback for tests and demos
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket client via `tokio-tungstenite`

mod config;
mod error;
pub mod memory;
mod transport;
#[cfg(feature = "websocket")]
mod websocket;

pub use config::TransportConfig;
pub use error::TransportError;
pub use transport::Transport;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnector, WebSocketLink};

use std::fmt;
use std::future::Future;

use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle of the transport's connection.
///
/// ```text
/// Disconnected ──connect──→ Connecting ──open──→ Open ──disconnect──→ Closing
///      ↑                      │    ↑                                    │
///      │                  error/timeout                                 │
///      │                      ↓    │ retry                              │
///      │                    Faulted                                     │
///      └──────────────────────── close ←────────────────────────────────┘
/// ```
///
/// A reconnect always passes through `Disconnected → Connecting`; there is
/// no `Open → Open` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
    /// The last attempt failed. Either a retry is scheduled or the retry
    /// budget is exhausted.
    Faulted,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for the current connect attempt.
///
/// `generation` increases with every attempt and every disconnect. A
/// delayed callback that captured an older generation is stale and does
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectAttempt {
    pub generation: u64,
    /// When the watchdog will check this attempt. `None` once resolved.
    pub deadline: Option<Instant>,
    pub retries_used: u32,
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Where to connect, plus optional headers for the handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Parses a `ws://` or `wss://` URL.
    ///
    /// # Errors
    /// [`TransportError::InvalidEndpoint`] for any other scheme or an
    /// empty host.
    pub fn websocket(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let rest = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(Self::new(url)),
            Some(_) => Err(TransportError::InvalidEndpoint {
                url,
                reason: "missing host".into(),
            }),
            None => Err(TransportError::InvalidEndpoint {
                url,
                reason: "scheme must be ws:// or wss://".into(),
            }),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

// ---------------------------------------------------------------------------
// Connector / Link
// ---------------------------------------------------------------------------

/// Opens physical connections.
///
/// The returned futures must be `Send` because attempts run on spawned
/// tasks. Implementations may write `async fn` directly.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Link: Link;

    /// Establishes one connection to `endpoint`.
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

/// A single established connection that moves framed messages.
///
/// `send` and `recv` are called concurrently from the writer and reader
/// tasks, so implementations must not hold one side's lock across the
/// other's await.
pub trait Link: Send + Sync + 'static {
    /// Sends one message to the peer.
    fn send(&self, data: Vec<u8>) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// Callbacks and events
// ---------------------------------------------------------------------------

/// The four callback slots a [`Transport`] fires.
///
/// Callbacks run on the transport's I/O tasks, not on the thread that
/// owns the transport. They are never invoked while the transport holds
/// its internal lock, so calling back into the transport is fine.
pub trait TransportListener: Send + Sync + 'static {
    /// The connection opened.
    fn on_open(&self) {}

    /// A message arrived.
    fn on_message(&self, data: Vec<u8>);

    /// The connection closed, locally or by the peer.
    fn on_close(&self, _reason: Option<&str>) {}

    /// A connect attempt, a send, or a receive failed.
    fn on_error(&self, _error: &TransportError) {}
}

/// State changes published on the transport's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connect attempt started. `attempt` counts from 1 within the
    /// current retry budget.
    Connecting { generation: u64, attempt: u32 },
    Connected { generation: u64 },
    /// The watchdog deadline passed with no open or error callback.
    ConnectTimedOut { generation: u64 },
    ConnectFailed { generation: u64, error: String },
    Disconnected { generation: u64, reason: Option<String> },
    /// No attempts remain. The transport stays down until an explicit
    /// connect.
    ConnectExhausted { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Faulted.to_string(), "faulted");
    }

    #[test]
    fn test_connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_open());
    }

    #[test]
    fn test_endpoint_websocket_accepts_ws_and_wss() {
        assert!(Endpoint::websocket("ws://127.0.0.1:9100").is_ok());
        assert!(Endpoint::websocket("wss://game.example.com/socket").is_ok());
    }

    #[test]
    fn test_endpoint_websocket_rejects_other_schemes() {
        let err = Endpoint::websocket("http://example.com").unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
        assert!(Endpoint::websocket("ws://").is_err());
    }

    #[test]
    fn test_endpoint_headers_preserve_order() {
        let ep = Endpoint::new("ws://h")
            .with_header("x-client", "desktop")
            .with_header("x-token", "abc");
        assert_eq!(
            ep.headers(),
            &[
                ("x-client".to_string(), "desktop".to_string()),
                ("x-token".to_string(), "abc".to_string())
            ]
        );
        assert_eq!(ep.to_string(), "ws://h");
    }
}
