//! `SessionBuilder`: the usual way to get a [`Session`].

use gamelink_protocol::{Codec, JsonCodec};
use gamelink_session::{Session, SessionConfig};
use gamelink_transport::{Connector, Endpoint, WebSocketConnector};

use crate::GamelinkError;

/// Builder for a client session.
///
/// # Example
///
/// ```rust,no_run
/// use gamelink::prelude::*;
///
/// # fn main() -> Result<(), GamelinkError> {
/// let mut session = SessionBuilder::new("ws://127.0.0.1:9100")
///     .header("x-client-version", "1.4.0")
///     .routing_id("shard-3")
///     .build()?;
/// session.connect();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    url: String,
    headers: Vec<(String, String)>,
    config: SessionConfig,
    routing_id: Option<String>,
}

impl SessionBuilder {
    /// Starts a builder for the server at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            config: SessionConfig::default(),
            routing_id: None,
        }
    }

    /// Adds a header to the connection handshake.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the routing hint, overriding the one in the configuration.
    pub fn routing_id(mut self, routing_id: impl Into<String>) -> Self {
        self.routing_id = Some(routing_id.into());
        self
    }

    /// Builds a WebSocket session with JSON payloads.
    ///
    /// # Errors
    /// [`GamelinkError::Transport`] if the URL is not a `ws://` or
    /// `wss://` URL.
    pub fn build(self) -> Result<Session<WebSocketConnector, JsonCodec>, GamelinkError> {
        let endpoint = Endpoint::websocket(self.url.clone())?;
        Ok(self.finish(endpoint, WebSocketConnector::new(), JsonCodec))
    }

    /// Builds a session over any connector and payload codec. The URL is
    /// passed to the connector as-is.
    pub fn build_with<C, K>(self, connector: C, codec: K) -> Session<C, K>
    where
        C: Connector,
        K: Codec + Clone,
    {
        let endpoint = Endpoint::new(self.url.clone());
        self.finish(endpoint, connector, codec)
    }

    fn finish<C, K>(self, mut endpoint: Endpoint, connector: C, codec: K) -> Session<C, K>
    where
        C: Connector,
        K: Codec + Clone,
    {
        for (name, value) in self.headers {
            endpoint = endpoint.with_header(name, value);
        }
        let mut config = self.config;
        if let Some(routing_id) = self.routing_id {
            config.routing_id = routing_id;
        }
        Session::new(connector, endpoint, config, codec)
    }
}
