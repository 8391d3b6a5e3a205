//! Integration tests for the WebSocket connector.
//!
//! A real `tokio-tungstenite` server runs on a loopback port picked by the
//! OS, and a [`Transport`] dials it with [`WebSocketConnector`].

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use gamelink_transport::{
        ConnectionState, Endpoint, Transport, TransportConfig, TransportEvent, TransportListener,
        WebSocketConnector,
    };
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    /// Forwards every inbound message to the test body.
    struct ChannelListener(mpsc::UnboundedSender<Vec<u8>>);

    impl TransportListener for ChannelListener {
        fn on_message(&self, data: Vec<u8>) {
            let _ = self.0.send(data);
        }
    }

    async fn wait_open(transport: &Transport<WebSocketConnector>) {
        for _ in 0..200 {
            if transport.state() == ConnectionState::Open {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transport never opened: {}", transport.state());
    }

    #[tokio::test]
    async fn test_websocket_round_trip_with_handshake_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("bound address");

        let seen_header = Arc::new(Mutex::new(None::<String>));
        let header_slot = Arc::clone(&seen_header);
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("should accept");
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                *header_slot.lock().unwrap() = req
                    .headers()
                    .get("x-client")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .expect("handshake");

            // Echo one binary frame, then wait for the client to leave.
            let msg = ws.next().await.expect("frame").expect("valid frame");
            ws.send(Message::Binary(msg.into_data()))
                .await
                .expect("echo");
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        });

        let endpoint = Endpoint::websocket(format!("ws://{addr}"))
            .expect("valid url")
            .with_header("x-client", "desktop");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = Transport::new(
            WebSocketConnector::new(),
            endpoint,
            TransportConfig::default(),
            Arc::new(ChannelListener(tx)),
        );

        transport.connect_async();
        wait_open(&transport).await;
        assert_eq!(seen_header.lock().unwrap().as_deref(), Some("desktop"));

        assert!(transport.send(b"ping".to_vec()));
        let echoed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("echo within timeout")
            .expect("listener alive");
        assert_eq!(echoed, b"ping");

        transport.disconnect();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server sees close")
            .expect("server task");
        for _ in 0..200 {
            if transport.state() == ConnectionState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_websocket_refused_port_reports_exhaustion() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
            listener.local_addr().expect("bound address")
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        let config = TransportConfig {
            max_retries: 0,
            ..TransportConfig::default()
        };
        let transport = Transport::new(
            WebSocketConnector::new(),
            Endpoint::websocket(format!("ws://{addr}")).expect("valid url"),
            config,
            Arc::new(ChannelListener(tx)),
        );
        let mut events = transport.subscribe();

        transport.connect_async();
        let exhausted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(TransportEvent::ConnectExhausted { attempts }) = events.recv().await {
                    return attempts;
                }
            }
        })
        .await
        .expect("exhaustion reported");

        assert_eq!(exhausted, 1);
        assert_eq!(transport.state(), ConnectionState::Faulted);
        assert!(transport.is_exhausted());
    }
}
