use std::collections::HashMap;

use crate::api::entity::{EntityId, EntityRecord};

/// One sequenced input as produced by a client. `seq` is strictly increasing
/// per connection; `timestamp` is the client wall clock in milliseconds; the
/// payload is opaque to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPackage {
    pub seq: u64,
    pub timestamp: u64,
    pub data: serde_json::Value,
}

/// Client → server messages. The handshake must be the first message on a
/// connection and carries the full credential map.
#[derive(Debug, Clone, PartialEq)]
pub enum InputMessage {
    Handshake {
        correlation_id: String,
        game: String,
        credentials: HashMap<String, String>,
    },
    Input {
        game: String,
        room: String,
        package: InputPackage,
    },
    Leave {
        game: String,
        room: String,
    },
}

/// Server → client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputMessage {
    /// Handshake acknowledgement, sent only after the join hook has run.
    Welcome {
        correlation_id: String,
        success: bool,
        game: String,
        room: String,
        spectator: bool,
        entity: Option<EntityId>,
        reason: Option<String>,
        retryable: bool,
    },
    /// Authoritative entity states at one server tick. `last_seq` is the
    /// highest input seq applied for the receiving player, for
    /// reconciliation; spectators always see zero.
    Snapshot {
        game: String,
        room: String,
        tick: u64,
        timestamp: u64,
        entities: Vec<EntityRecord>,
        last_seq: u64,
    },
    PlayerJoined {
        room: String,
        player: u64,
        display_name: String,
    },
    PlayerLeft {
        room: String,
        player: u64,
    },
    GameOver {
        room: String,
    },
    Error {
        description: String,
        retryable: bool,
    },
}
