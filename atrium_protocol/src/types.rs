// Core identifier and coordinate types for the room relay protocol.
//
// Identifiers are caller-supplied opaque strings — the relay never parses
// or generates them. Clients mint their own ids (the reference frontend
// uses `player_<random>` / `room_<random>`), and the relay only requires
// that a player id stays unique for the lifetime of its connection.
//
// Newtype structs serialize transparently as their inner value, so
// `PlayerId("player_a1".into())` appears on the wire as `"player_a1"`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied player identifier, unique per live connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied room identifier. A room is an isolated broadcast domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of an area of interest ("zone") inside a room's shared scene.
/// The relay treats it as opaque — zones are purely client-side geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneIndex(pub u32);

/// Planar position of a player. The vertical axis is client-side only,
/// so the wire carries just the two ground-plane coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub z: f64,
}

impl Position {
    /// Spawn position for a freshly joined player.
    pub const ORIGIN: Position = Position { x: 0.0, z: 0.0 };
}
