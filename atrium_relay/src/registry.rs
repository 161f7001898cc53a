// Session registry: which connection joined as which player, in which room.
//
// One entry per live, joined connection. Entries are created by the join
// handler and removed exactly once on disconnect (`unregister` is
// idempotent, so a racing eviction followed by the transport close is
// harmless). The registry holds only identifiers — the room directory
// owns the actual member records and connection write halves.
//
// Handlers for messages that carry no sender identity (`player_move`,
// zone events) use `lookup` to resolve "who sent this".

use std::collections::BTreeMap;

use atrium_protocol::types::{PlayerId, RoomId};
use thiserror::Error;

/// Relay-assigned connection identifier. Opaque, never sent on the wire —
/// it tags reader threads so events can be attributed to a connection
/// before (and independent of) any join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

/// The (player, room) pair a connection joined as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEntry {
    pub player_id: PlayerId,
    pub room_id: RoomId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The connection already holds a session. A connection joins exactly
    /// once; the existing session is left untouched.
    #[error("connection is already bound to a session")]
    DuplicateSession,
}

/// Maps live connections to their session bindings.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<ConnId, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the (player, room) binding for a connection. Fails if the
    /// connection is already registered.
    pub fn register(
        &mut self,
        conn: ConnId,
        player_id: PlayerId,
        room_id: RoomId,
    ) -> Result<(), SessionError> {
        if self.sessions.contains_key(&conn) {
            return Err(SessionError::DuplicateSession);
        }
        self.sessions.insert(conn, SessionEntry { player_id, room_id });
        Ok(())
    }

    /// Resolve the session a connection joined as, if any.
    pub fn lookup(&self, conn: ConnId) -> Option<&SessionEntry> {
        self.sessions.get(&conn)
    }

    /// Remove a connection's session. Idempotent: returns the entry if one
    /// existed, `None` otherwise.
    pub fn unregister(&mut self, conn: ConnId) -> Option<SessionEntry> {
        self.sessions.remove(&conn)
    }

    /// Find the connection currently bound to a (player, room) pair. Used
    /// to evict the stale session when a player id rejoins from a new
    /// connection.
    pub fn find_binding(&self, player_id: &PlayerId, room_id: &RoomId) -> Option<ConnId> {
        self.sessions
            .iter()
            .find(|(_, entry)| &entry.player_id == player_id && &entry.room_id == room_id)
            .map(|(conn, _)| *conn)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
