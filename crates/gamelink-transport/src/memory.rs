//! In-process loopback transport.
//!
//! [`MemoryConnector`] hands out [`MemoryLink`]s whose other end is a
//! [`MemoryPeer`] the caller can play server with. Each connect can be
//! told to succeed, fail, or never resolve, which is what the watchdog
//! and heartbeat behaviour needs to be exercised without a network.

use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::{Connector, Endpoint, Link, TransportError};

/// What the next connect attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    /// Succeed immediately and queue a [`MemoryPeer`].
    #[default]
    Accept,
    /// Fail immediately with a refused connection.
    Refuse,
    /// Never resolve; only the watchdog can end the attempt.
    Hang,
}

/// Connector whose "server" lives in the same process.
///
/// Cloning shares the underlying state, so a test can keep one clone and
/// hand the other to a [`Transport`](crate::Transport).
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<ConnectorShared>,
}

struct ConnectorShared {
    behavior: Mutex<ConnectBehavior>,
    attempts: AtomicUsize,
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    peers_rx: AsyncMutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(ConnectBehavior::Accept)
    }
}

impl MemoryConnector {
    pub fn new(behavior: ConnectBehavior) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(ConnectorShared {
                behavior: Mutex::new(behavior),
                attempts: AtomicUsize::new(0),
                peers_tx,
                peers_rx: AsyncMutex::new(peers_rx),
            }),
        }
    }

    /// Changes what subsequent attempts do.
    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        *self
            .shared
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Waits for the server side of the next accepted connection.
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.shared.peers_rx.lock().await.recv().await
    }

    /// Returns the server side of an accepted connection, if one is queued.
    pub fn try_accept(&self) -> Option<MemoryPeer> {
        self.shared.peers_rx.try_lock().ok()?.try_recv().ok()
    }
}

impl Connector for MemoryConnector {
    type Link = MemoryLink;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MemoryLink, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = *self
            .shared
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match behavior {
            ConnectBehavior::Accept => {
                let (client, peer) = MemoryLink::pair();
                self.shared
                    .peers_tx
                    .send(peer)
                    .map_err(|_| refused(endpoint))?;
                Ok(client)
            }
            ConnectBehavior::Refuse => Err(refused(endpoint)),
            ConnectBehavior::Hang => future::pending().await,
        }
    }
}

fn refused(endpoint: &Endpoint) -> TransportError {
    TransportError::ConnectFailed(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        format!("{endpoint} refused the connection"),
    ))
}

/// Client end of an in-memory connection.
pub struct MemoryLink {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryLink {
    fn pair() -> (MemoryLink, MemoryPeer) {
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let link = MemoryLink {
            tx: Mutex::new(Some(to_server)),
            rx: AsyncMutex::new(from_server),
        };
        let peer = MemoryPeer {
            tx: Some(to_client),
            rx: from_client,
        };
        (link, peer)
    }
}

impl Link for MemoryLink {
    async fn send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx
                .send(data)
                .map_err(|_| TransportError::ConnectionClosed("peer went away".into())),
            None => Err(TransportError::ConnectionClosed("link closed".into())),
        }
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// Server end of an in-memory connection.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryPeer {
    /// Sends a message to the client. Returns `false` once either side
    /// has closed.
    pub fn send(&self, data: Vec<u8>) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(data).is_ok())
    }

    /// Waits for the next client message. `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// The next client message, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Closes the server side; the client's reader sees a clean close.
    pub fn close(&mut self) {
        self.tx = None;
    }
}
