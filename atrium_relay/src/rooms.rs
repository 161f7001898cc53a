// Room directory: authoritative membership state for every active room.
//
// A room is a broadcast domain keyed by its caller-supplied id. Each member
// record owns the write half of its connection (wrapped in `BufWriter`), so
// the directory doubles as the broadcaster — delivering a message to a
// room's members means walking one map.
//
// Invariant: the directory never holds an empty room. Rooms are created
// lazily by the first `add_member` for an unseen id and deleted inside the
// same `remove_member` call that drops the last member. All mutation
// happens from the server's single-threaded event loop — no internal
// locking.
//
// Write errors on a single member are logged and skipped: the member's
// reader thread will observe the broken transport and surface a disconnect
// event, which is where cleanup happens. A failed delivery must never
// abort the rest of a broadcast.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::TcpStream;

use atrium_protocol::framing::write_message;
use atrium_protocol::message::{PlayerInfo, ServerMessage};
use atrium_protocol::types::{PlayerId, Position, RoomId};

/// Display name substituted when a client joins with an empty name.
pub const DEFAULT_PLAYER_NAME: &str = "Guest";

/// One member of a room: display state plus the connection write half.
struct MemberRecord {
    name: String,
    position: Position,
    writer: BufWriter<TcpStream>,
}

/// A single room's membership table.
#[derive(Default)]
struct Room {
    members: BTreeMap<PlayerId, MemberRecord>,
}

impl Room {
    fn snapshot(&self) -> Vec<PlayerInfo> {
        self.members
            .iter()
            .map(|(id, member)| PlayerInfo {
                id: id.clone(),
                name: member.name.clone(),
                position: member.position,
            })
            .collect()
    }
}

/// All active rooms, keyed by room id.
#[derive(Default)]
pub struct RoomDirectory {
    rooms: BTreeMap<RoomId, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room for `room_id`, creating an empty one if unseen.
    /// Only callable on the add path — every other operation treats a
    /// missing room as a stale reference.
    fn ensure_room(&mut self, room_id: &RoomId) -> &mut Room {
        self.rooms.entry(room_id.clone()).or_default()
    }

    /// Insert a player into a room (creating the room if needed) and return
    /// the full membership snapshot including the new member.
    ///
    /// New members spawn at the origin. An empty display name is replaced
    /// with `DEFAULT_PLAYER_NAME`. If the player id is already present the
    /// new record overwrites the old one — the caller is responsible for
    /// evicting the stale session binding (see `Relay::join`).
    pub fn add_member(
        &mut self,
        room_id: &RoomId,
        player_id: &PlayerId,
        name: &str,
        stream: TcpStream,
    ) -> Vec<PlayerInfo> {
        let name = if name.trim().is_empty() {
            DEFAULT_PLAYER_NAME.to_string()
        } else {
            name.to_string()
        };

        let room = self.ensure_room(room_id);
        room.members.insert(
            player_id.clone(),
            MemberRecord {
                name,
                position: Position::ORIGIN,
                writer: BufWriter::new(stream),
            },
        );
        room.snapshot()
    }

    /// Overwrite a member's stored position. Fire-and-forget: a missing
    /// room or player is a harmless race with a just-processed disconnect,
    /// not an error.
    pub fn update_position(&mut self, room_id: &RoomId, player_id: &PlayerId, position: Position) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            if let Some(member) = room.members.get_mut(player_id) {
                member.position = position;
            }
        }
    }

    /// Remove a player from a room, deleting the room in the same operation
    /// if it becomes empty. Returns the snapshot of the remaining members,
    /// or `None` if the room or player was not present.
    pub fn remove_member(&mut self, room_id: &RoomId, player_id: &PlayerId) -> Option<Vec<PlayerInfo>> {
        let room = self.rooms.get_mut(room_id)?;
        room.members.remove(player_id)?;

        if room.members.is_empty() {
            self.rooms.remove(room_id);
            return Some(Vec::new());
        }
        Some(room.snapshot())
    }

    /// Read-only membership snapshot. Empty if the room does not exist.
    pub fn members(&self, room_id: &RoomId) -> Vec<PlayerInfo> {
        self.rooms.get(room_id).map(Room::snapshot).unwrap_or_default()
    }

    /// Whether a room currently exists (i.e. has at least one member).
    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Send a message to a single member. Write errors are logged and
    /// otherwise ignored — the member's reader thread detects the broken
    /// pipe.
    pub fn send_to(&mut self, room_id: &RoomId, player_id: &PlayerId, msg: &ServerMessage) {
        let Ok(json) = serde_json::to_vec(msg) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(room_id) {
            if let Some(member) = room.members.get_mut(player_id) {
                if let Err(e) = write_message(&mut member.writer, &json) {
                    log::debug!("send to {player_id} in {room_id} failed: {e}");
                }
            }
        }
    }

    /// Deliver a message to every member of a room except `exclude`.
    /// Fire-and-forget per recipient: one failed send never aborts
    /// delivery to the others.
    pub fn broadcast(&mut self, room_id: &RoomId, msg: &ServerMessage, exclude: Option<&PlayerId>) {
        let Ok(json) = serde_json::to_vec(msg) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        for (player_id, member) in &mut room.members {
            if Some(player_id) == exclude {
                continue;
            }
            if let Err(e) = write_message(&mut member.writer, &json) {
                log::debug!("broadcast to {player_id} in {room_id} failed: {e}");
            }
        }
    }
}
