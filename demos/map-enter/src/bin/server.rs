//! Minimal reference server: acknowledges heartbeats and accepts every
//! map-enter request.

use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use gamelink::GamelinkError;
use gamelink::protocol::{
    Codec, Heartbeat, HeartbeatAck, JsonCodec, MessageCodec, MessageEnvelope, Opcode,
};
use map_enter::{DEFAULT_ADDR, MAP_ENTER_REQUEST, MAP_ENTER_RESPONSE, MapEnterRequest, MapEnterResponse};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<(), GamelinkError> {
    gamelink::telemetry::init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "map-enter server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            info!(%peer, "client connected");
            if let Err(e) = serve(stream).await {
                warn!(%peer, error = %e, "connection ended with error");
            }
            info!(%peer, "client disconnected");
        });
    }
}

async fn serve(stream: TcpStream) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;
    let frames = MessageCodec::default();

    while let Some(msg) = ws.next().await {
        let data = match msg? {
            Message::Binary(data) => data,
            Message::Close(_) => break,
            _ => continue,
        };
        for envelope in frames.decode_all(&data) {
            let envelope = match envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                    break;
                }
            };
            if let Some((opcode, payload)) = respond(&envelope)? {
                let bytes = frames.encode(opcode, "", &payload)?;
                ws.send(Message::Binary(bytes.into())).await?;
            }
        }
    }
    Ok(())
}

fn respond(envelope: &MessageEnvelope) -> Result<Option<(Opcode, Vec<u8>)>, GamelinkError> {
    match envelope.opcode {
        Opcode::HEARTBEAT_REQUEST => {
            let beat: Heartbeat = JsonCodec.decode(&envelope.payload)?;
            let ack = HeartbeatAck {
                client_time: beat.client_time,
                server_time: unix_millis(),
            };
            Ok(Some((Opcode::HEARTBEAT_RESPONSE, JsonCodec.encode(&ack)?)))
        }
        MAP_ENTER_REQUEST => {
            let req: MapEnterRequest = JsonCodec.decode(&envelope.payload)?;
            info!(map_id = req.map_id, player = %req.player, "map enter");
            let resp = MapEnterResponse {
                map_id: req.map_id,
                accepted: true,
                routing_id: envelope.routing_id.clone(),
            };
            Ok(Some((MAP_ENTER_RESPONSE, JsonCodec.encode(&resp)?)))
        }
        other => {
            debug!(opcode = %other, "ignoring opcode");
            Ok(None)
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
