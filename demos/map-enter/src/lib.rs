//! Messages shared by the map-enter client and server.

use gamelink::protocol::Opcode;
use serde::{Deserialize, Serialize};

pub const MAP_ENTER_REQUEST: Opcode = Opcode(101);
pub const MAP_ENTER_RESPONSE: Opcode = Opcode(102);

pub const DEFAULT_ADDR: &str = "127.0.0.1:9100";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEnterRequest {
    pub map_id: u32,
    pub player: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEnterResponse {
    pub map_id: u32,
    pub accepted: bool,
    /// Routing id the request arrived with, echoed for inspection.
    pub routing_id: String,
}
