// Protocol messages for client-relay communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by frontends to the relay.
// - `ServerMessage`: sent by the relay to frontends.
//
// Every message is a JSON object with a string `type` field and camelCase
// payload fields, matching what the browser frontend speaks. Internally
// tagged serde enums with `rename_all_fields` produce that shape directly,
// e.g. `ServerMessage::PlayerMoved` becomes
// `{"type":"player_moved","playerId":"...","position":{"x":..,"z":..}}`.
//
// `ClientMessage::Unknown` (`#[serde(other)]`) absorbs message kinds this
// relay does not recognize. The router drops them without logging — newer
// clients may speak additional kinds, and that must not be an error.
//
// `player_move` and the zone events carry no sender identity; the relay
// resolves the sender from its session registry. Extra fields sent by
// older clients are ignored by serde.

use serde::{Deserialize, Serialize};

use crate::types::{PlayerId, Position, RoomId, ZoneIndex};

/// Messages sent by a client to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Create a room and join it. Server-side this is identical to
    /// `JoinRoom` — the distinction only matters for the client's own UI.
    CreateRoom {
        room_id: RoomId,
        player_id: PlayerId,
        player_name: String,
    },
    /// Join an existing room (created lazily if it does not exist).
    JoinRoom {
        room_id: RoomId,
        player_id: PlayerId,
        player_name: String,
    },
    /// The sender moved to a new position.
    PlayerMove { position: Position },
    /// The sender entered a zone.
    ZoneEntered { zone_index: ZoneIndex },
    /// The sender exited a zone.
    ZoneExited { zone_index: ZoneIndex },
    /// Any message kind this relay does not recognize.
    #[serde(other)]
    Unknown,
}

/// Messages sent by the relay to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Join acknowledgment, sent only to the joining connection. The
    /// snapshot includes the new member.
    RoomJoined {
        room_id: RoomId,
        players: Vec<PlayerInfo>,
    },
    /// Another player joined the room. Sent to everyone except the joiner.
    PlayerJoined {
        player: PlayerInfo,
        players: Vec<PlayerInfo>,
    },
    /// A player left the room (disconnect). The snapshot is the remaining
    /// membership.
    PlayerLeft {
        player_id: PlayerId,
        players: Vec<PlayerInfo>,
    },
    /// A player moved.
    PlayerMoved {
        player_id: PlayerId,
        position: Position,
    },
    /// A player entered a zone.
    PlayerZoneEntered {
        player_id: PlayerId,
        zone_index: ZoneIndex,
    },
    /// A player exited a zone.
    PlayerZoneExited {
        player_id: PlayerId,
        zone_index: ZoneIndex,
    },
}

/// Public identity of a room member, as carried in member snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub position: Position,
}
