//! Frame-loop client: enters a map on every (re)connect and logs the reply.

use std::time::Duration;

use gamelink::prelude::*;
use map_enter::{DEFAULT_ADDR, MAP_ENTER_REQUEST, MAP_ENTER_RESPONSE, MapEnterRequest, MapEnterResponse};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const FRAME: Duration = Duration::from_millis(33);

#[tokio::main]
async fn main() -> Result<(), GamelinkError> {
    gamelink::telemetry::init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let config = match args.next() {
        Some(path) => load_config(path)?,
        None => SessionConfig::default(),
    };

    let mut session = SessionBuilder::new(format!("ws://{addr}"))
        .header("x-client", "map-enter-demo")
        .config(config)
        .build()?;
    let mut events = session.subscribe();

    session.on(MAP_ENTER_RESPONSE, |resp: MapEnterResponse| {
        info!(map_id = resp.map_id, accepted = resp.accepted, routing_id = %resp.routing_id, "map entered");
        Ok(())
    });
    session.connect();

    let mut frame = tokio::time::interval(FRAME);
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = frame.tick() => {}
        }

        session.tick();
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::Connected => {
                    let req = MapEnterRequest { map_id: 1, player: "demo".into() };
                    if let Err(e) = session.try_send(MAP_ENTER_REQUEST, &req) {
                        warn!(error = %e, "map enter request not sent");
                    }
                }
                SessionEvent::Disconnected { reason } => info!(?reason, "lost connection"),
                SessionEvent::ConnectExhausted { attempts } => {
                    warn!(attempts, "server unreachable, giving up");
                    return Ok(());
                }
            }
        }
    }

    info!("shutting down");
    session.disconnect();
    Ok(())
}
