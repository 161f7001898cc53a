// Relay service: the single owner of all mutable relay state.
//
// `Relay` is the central data structure that `server.rs` drives. It owns
// the session registry, the room directory, and the write halves of
// connections that have not joined a room yet. All mutation happens through
// methods called from the server's single-threaded event loop — no internal
// locking, and no handler ever observes a partially applied effect of
// another.
//
// Connection lifecycle (one-way): Unjoined → Joined → Closed.
// - A connection enters Unjoined via `add_connection` (its writer parked
//   in `unjoined`).
// - A `create_room`/`join_room` message moves it to Joined: the writer
//   moves into the room directory's member record and the session registry
//   gains the (player, room) binding.
// - `disconnect` is terminal in either state. For an Unjoined connection
//   it only drops the parked writer; for a Joined one it removes the
//   member, broadcasts `player_left` to whoever remains, and unregisters
//   the session.
//
// The router (`handle_message`) dispatches on message kind. Messages that
// need a sender identity resolve it via the registry; a missing session
// (traffic before join, or racing a disconnect) drops the message
// silently. Unknown kinds are dropped without logging — forward
// compatibility, not an error.

use std::collections::BTreeMap;
use std::net::TcpStream;

use atrium_protocol::message::{ClientMessage, PlayerInfo, ServerMessage};
use atrium_protocol::types::{PlayerId, Position, RoomId, ZoneIndex};

use crate::registry::{ConnId, SessionRegistry};
use crate::rooms::RoomDirectory;

/// Room relay state: sessions, rooms, and not-yet-joined connections.
pub struct Relay {
    /// Write halves of connections that have not joined a room yet.
    unjoined: BTreeMap<ConnId, TcpStream>,
    sessions: SessionRegistry,
    rooms: RoomDirectory,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            unjoined: BTreeMap::new(),
            sessions: SessionRegistry::new(),
            rooms: RoomDirectory::new(),
        }
    }

    /// Track a freshly accepted connection in the Unjoined state. `stream`
    /// is the write half; the server keeps the read half on the
    /// connection's reader thread.
    pub fn add_connection(&mut self, conn: ConnId, stream: TcpStream) {
        self.unjoined.insert(conn, stream);
    }

    /// Route one inbound message. Called for every decoded message in the
    /// order the connection sent them.
    pub fn handle_message(&mut self, conn: ConnId, message: ClientMessage) {
        match message {
            // Create and join are intentionally the same operation: a join
            // addressed to an unseen room id creates the room. The two
            // kinds exist for the client's own UI bookkeeping.
            ClientMessage::CreateRoom {
                room_id,
                player_id,
                player_name,
            }
            | ClientMessage::JoinRoom {
                room_id,
                player_id,
                player_name,
            } => {
                self.join(conn, room_id, player_id, &player_name);
            }
            ClientMessage::PlayerMove { position } => {
                self.player_move(conn, position);
            }
            ClientMessage::ZoneEntered { zone_index } => {
                self.zone_event(conn, zone_index, true);
            }
            ClientMessage::ZoneExited { zone_index } => {
                self.zone_event(conn, zone_index, false);
            }
            ClientMessage::Unknown => {
                // Unrecognized kind — drop, keep the connection.
            }
        }
    }

    /// Transport close for a connection, in whatever state it is in.
    /// Called exactly once per connection; everything here is idempotent
    /// regardless.
    pub fn disconnect(&mut self, conn: ConnId) {
        if self.unjoined.remove(&conn).is_some() {
            // Never joined a room — nothing to broadcast or clean up.
            return;
        }

        let Some(entry) = self.sessions.unregister(conn) else {
            // Already evicted (player id rejoined from another connection).
            return;
        };

        let Some(remaining) = self.rooms.remove_member(&entry.room_id, &entry.player_id) else {
            return;
        };
        log::debug!(
            "{} left {} ({} remaining)",
            entry.player_id,
            entry.room_id,
            remaining.len()
        );
        if !remaining.is_empty() {
            self.rooms.broadcast(
                &entry.room_id,
                &ServerMessage::PlayerLeft {
                    player_id: entry.player_id,
                    players: remaining,
                },
                None,
            );
        }
    }

    /// Number of live sessions, for logging and tests.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Read-only view of the room directory, for tests.
    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    fn join(&mut self, conn: ConnId, room_id: RoomId, player_id: PlayerId, player_name: &str) {
        if self.sessions.lookup(conn).is_some() {
            // A connection joins exactly once. Reject the second attempt
            // without touching the existing session.
            log::warn!("connection {conn:?} sent a second join; ignoring");
            return;
        }
        let Some(stream) = self.unjoined.remove(&conn) else {
            return;
        };

        // If this player id is already bound to another live connection in
        // the same room, that binding is stale from the relay's point of
        // view: the new connection wins and the old one is evicted so its
        // eventual transport close cleans up nothing twice.
        if let Some(stale) = self.sessions.find_binding(&player_id, &room_id) {
            log::warn!("{player_id} rejoined {room_id}; evicting stale session on {stale:?}");
            self.sessions.unregister(stale);
        }

        let players = self.rooms.add_member(&room_id, &player_id, player_name, stream);
        if let Err(e) = self.sessions.register(conn, player_id.clone(), room_id.clone()) {
            // Unreachable after the lookup above; keep the state consistent
            // if it ever happens.
            log::error!("session registration failed for {player_id}: {e}");
            self.rooms.remove_member(&room_id, &player_id);
            return;
        }

        log::info!("{player_id} joined {room_id} ({} members)", players.len());

        // Acknowledge to the joiner with the full roster, then announce the
        // new member to everyone else.
        let new_member = players
            .iter()
            .find(|p| p.id == player_id)
            .cloned()
            .unwrap_or(PlayerInfo {
                id: player_id.clone(),
                name: player_name.to_string(),
                position: Position::ORIGIN,
            });
        self.rooms.send_to(
            &room_id,
            &player_id,
            &ServerMessage::RoomJoined {
                room_id: room_id.clone(),
                players: players.clone(),
            },
        );
        self.rooms.broadcast(
            &room_id,
            &ServerMessage::PlayerJoined {
                player: new_member,
                players,
            },
            Some(&player_id),
        );
    }

    fn player_move(&mut self, conn: ConnId, position: Position) {
        let Some(entry) = self.sessions.lookup(conn) else {
            return;
        };
        let (player_id, room_id) = (entry.player_id.clone(), entry.room_id.clone());

        self.rooms.update_position(&room_id, &player_id, position);
        self.rooms.broadcast(
            &room_id,
            &ServerMessage::PlayerMoved {
                player_id: player_id.clone(),
                position,
            },
            Some(&player_id),
        );
    }

    fn zone_event(&mut self, conn: ConnId, zone_index: ZoneIndex, entered: bool) {
        let Some(entry) = self.sessions.lookup(conn) else {
            return;
        };
        let (player_id, room_id) = (entry.player_id.clone(), entry.room_id.clone());

        // Stateless pass-through: the relay keeps no zone occupancy.
        let msg = if entered {
            ServerMessage::PlayerZoneEntered {
                player_id: player_id.clone(),
                zone_index,
            }
        } else {
            ServerMessage::PlayerZoneExited {
                player_id: player_id.clone(),
                zone_index,
            }
        };
        self.rooms.broadcast(&room_id, &msg, Some(&player_id));
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::time::Duration;

    use atrium_protocol::framing::read_message;

    use super::*;

    /// Create a TCP pair: (client_stream, server_stream) on localhost.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    /// Read a ServerMessage from a TCP stream.
    fn recv_server_msg(reader: &mut BufReader<TcpStream>) -> ServerMessage {
        let bytes = read_message(reader).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Assert no message is waiting on this stream (short read timeout).
    fn assert_silent(reader: &mut BufReader<TcpStream>) {
        reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        assert!(read_message(reader).is_err(), "expected no pending message");
    }

    fn pid(s: &str) -> PlayerId {
        PlayerId(s.into())
    }

    fn rid(s: &str) -> RoomId {
        RoomId(s.into())
    }

    fn join_msg(room: &str, player: &str, name: &str) -> ClientMessage {
        ClientMessage::JoinRoom {
            room_id: rid(room),
            player_id: pid(player),
            player_name: name.into(),
        }
    }

    /// Connect a client to the relay: returns (conn id, client-side reader).
    fn attach(relay: &mut Relay, conn: u64) -> (ConnId, BufReader<TcpStream>) {
        let (client, server) = tcp_pair();
        let conn = ConnId(conn);
        relay.add_connection(conn, server);
        (conn, BufReader::new(client))
    }

    #[test]
    fn first_join_creates_room_and_acknowledges() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));

        assert!(relay.rooms().contains_room(&rid("alpha")));
        assert_eq!(relay.session_count(), 1);

        match recv_server_msg(&mut reader_a) {
            ServerMessage::RoomJoined { room_id, players } => {
                assert_eq!(room_id, rid("alpha"));
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, pid("a"));
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }
        // The sole member gets no player_joined echo.
        assert_silent(&mut reader_a);
    }

    #[test]
    fn create_room_behaves_like_join() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);

        relay.handle_message(
            conn_a,
            ClientMessage::CreateRoom {
                room_id: rid("alpha"),
                player_id: pid("a"),
                player_name: "Alice".into(),
            },
        );

        assert!(matches!(
            recv_server_msg(&mut reader_a),
            ServerMessage::RoomJoined { .. }
        ));
    }

    #[test]
    fn second_join_announces_to_existing_members() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        let (conn_b, mut reader_b) = attach(&mut relay, 2);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        let _room_joined_a = recv_server_msg(&mut reader_a);

        relay.handle_message(conn_b, join_msg("alpha", "b", "Bob"));

        // Bob gets the acknowledgment with both members.
        match recv_server_msg(&mut reader_b) {
            ServerMessage::RoomJoined { players, .. } => {
                assert_eq!(players.len(), 2);
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }

        // Alice gets the announcement, also with both members.
        match recv_server_msg(&mut reader_a) {
            ServerMessage::PlayerJoined { player, players } => {
                assert_eq!(player.id, pid("b"));
                assert_eq!(player.name, "Bob");
                assert_eq!(players.len(), 2);
            }
            other => panic!("expected PlayerJoined, got {other:?}"),
        }
    }

    #[test]
    fn move_broadcasts_to_others_but_not_sender() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        let (conn_b, mut reader_b) = attach(&mut relay, 2);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        relay.handle_message(conn_b, join_msg("alpha", "b", "Bob"));
        let _ = recv_server_msg(&mut reader_a); // room_joined
        let _ = recv_server_msg(&mut reader_a); // player_joined (Bob)
        let _ = recv_server_msg(&mut reader_b); // room_joined

        relay.handle_message(
            conn_a,
            ClientMessage::PlayerMove {
                position: Position { x: 3.0, z: 4.0 },
            },
        );

        match recv_server_msg(&mut reader_b) {
            ServerMessage::PlayerMoved { player_id, position } => {
                assert_eq!(player_id, pid("a"));
                assert_eq!(position, Position { x: 3.0, z: 4.0 });
            }
            other => panic!("expected PlayerMoved, got {other:?}"),
        }
        assert_silent(&mut reader_a);

        // The stored position was updated too.
        let members = relay.rooms().members(&rid("alpha"));
        let alice = members.iter().find(|p| p.id == pid("a")).unwrap();
        assert_eq!(alice.position, Position { x: 3.0, z: 4.0 });
    }

    #[test]
    fn zone_events_are_relayed_with_sender_identity() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        let (conn_b, mut reader_b) = attach(&mut relay, 2);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        relay.handle_message(conn_b, join_msg("alpha", "b", "Bob"));
        let _ = recv_server_msg(&mut reader_a);
        let _ = recv_server_msg(&mut reader_a);
        let _ = recv_server_msg(&mut reader_b);

        relay.handle_message(
            conn_b,
            ClientMessage::ZoneEntered {
                zone_index: ZoneIndex(2),
            },
        );
        relay.handle_message(
            conn_b,
            ClientMessage::ZoneExited {
                zone_index: ZoneIndex(2),
            },
        );

        match recv_server_msg(&mut reader_a) {
            ServerMessage::PlayerZoneEntered { player_id, zone_index } => {
                assert_eq!(player_id, pid("b"));
                assert_eq!(zone_index, ZoneIndex(2));
            }
            other => panic!("expected PlayerZoneEntered, got {other:?}"),
        }
        assert!(matches!(
            recv_server_msg(&mut reader_a),
            ServerMessage::PlayerZoneExited { .. }
        ));
        assert_silent(&mut reader_b);
    }

    #[test]
    fn traffic_before_join_is_dropped() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);

        relay.handle_message(
            conn_a,
            ClientMessage::PlayerMove {
                position: Position { x: 1.0, z: 1.0 },
            },
        );
        relay.handle_message(
            conn_a,
            ClientMessage::ZoneEntered {
                zone_index: ZoneIndex(0),
            },
        );

        assert_eq!(relay.session_count(), 0);
        assert_eq!(relay.rooms().room_count(), 0);
        assert_silent(&mut reader_a);
    }

    #[test]
    fn unknown_kind_is_dropped_and_connection_survives() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);

        relay.handle_message(conn_a, ClientMessage::Unknown);
        // The connection can still join afterwards.
        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        assert!(matches!(
            recv_server_msg(&mut reader_a),
            ServerMessage::RoomJoined { .. }
        ));
    }

    #[test]
    fn disconnect_before_join_is_a_noop() {
        let mut relay = Relay::new();
        let (conn_a, _reader_a) = attach(&mut relay, 1);

        relay.disconnect(conn_a);
        assert_eq!(relay.session_count(), 0);
        assert_eq!(relay.rooms().room_count(), 0);
    }

    #[test]
    fn disconnect_broadcasts_player_left_with_remaining_roster() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        let (conn_b, mut reader_b) = attach(&mut relay, 2);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        relay.handle_message(conn_b, join_msg("alpha", "b", "Bob"));
        let _ = recv_server_msg(&mut reader_a);
        let _ = recv_server_msg(&mut reader_a);
        let _ = recv_server_msg(&mut reader_b);

        relay.disconnect(conn_a);

        match recv_server_msg(&mut reader_b) {
            ServerMessage::PlayerLeft { player_id, players } => {
                assert_eq!(player_id, pid("a"));
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, pid("b"));
            }
            other => panic!("expected PlayerLeft, got {other:?}"),
        }
        assert_eq!(relay.session_count(), 1);
        assert_eq!(relay.rooms().members(&rid("alpha")).len(), 1);
    }

    #[test]
    fn last_disconnect_deletes_the_room() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        let _ = recv_server_msg(&mut reader_a);

        relay.disconnect(conn_a);
        assert!(!relay.rooms().contains_room(&rid("alpha")));
        assert_eq!(relay.session_count(), 0);
    }

    #[test]
    fn room_id_is_reusable_after_teardown() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        let _ = recv_server_msg(&mut reader_a);
        relay.disconnect(conn_a);

        // Fresh connection, same room id: exactly one member, no residue.
        let (conn_b, mut reader_b) = attach(&mut relay, 2);
        relay.handle_message(conn_b, join_msg("alpha", "b", "Bob"));
        match recv_server_msg(&mut reader_b) {
            ServerMessage::RoomJoined { players, .. } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].id, pid("b"));
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }
    }

    #[test]
    fn second_join_on_same_connection_is_rejected() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        let _ = recv_server_msg(&mut reader_a);

        relay.handle_message(conn_a, join_msg("beta", "a2", "Alice II"));

        // No second room, no second session, no reply.
        assert!(!relay.rooms().contains_room(&rid("beta")));
        assert_eq!(relay.session_count(), 1);
        assert_silent(&mut reader_a);

        // The original session still works.
        relay.disconnect(conn_a);
        assert!(!relay.rooms().contains_room(&rid("alpha")));
    }

    #[test]
    fn rejoining_player_id_evicts_the_stale_session() {
        let mut relay = Relay::new();
        let (conn_old, mut reader_old) = attach(&mut relay, 1);
        let (conn_new, mut reader_new) = attach(&mut relay, 2);

        relay.handle_message(conn_old, join_msg("alpha", "a", "Alice"));
        let _ = recv_server_msg(&mut reader_old);

        // Same player id, new connection.
        relay.handle_message(conn_new, join_msg("alpha", "a", "Alice"));
        match recv_server_msg(&mut reader_new) {
            ServerMessage::RoomJoined { players, .. } => {
                assert_eq!(players.len(), 1);
            }
            other => panic!("expected RoomJoined, got {other:?}"),
        }
        assert_eq!(relay.session_count(), 1);

        // The old connection's close must not tear down the new member.
        relay.disconnect(conn_old);
        assert!(relay.rooms().contains_room(&rid("alpha")));
        assert_eq!(relay.session_count(), 1);
        assert_silent(&mut reader_new);

        relay.disconnect(conn_new);
        assert!(!relay.rooms().contains_room(&rid("alpha")));
    }

    #[test]
    fn rooms_are_isolated_broadcast_domains() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        let (conn_b, mut reader_b) = attach(&mut relay, 2);

        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        relay.handle_message(conn_b, join_msg("beta", "b", "Bob"));
        let _ = recv_server_msg(&mut reader_a);
        let _ = recv_server_msg(&mut reader_b);

        relay.handle_message(
            conn_a,
            ClientMessage::PlayerMove {
                position: Position { x: 7.0, z: 7.0 },
            },
        );

        // Bob is in another room and hears nothing.
        assert_silent(&mut reader_b);
    }

    #[test]
    fn stale_move_after_disconnect_is_ignored() {
        let mut relay = Relay::new();
        let (conn_a, mut reader_a) = attach(&mut relay, 1);
        relay.handle_message(conn_a, join_msg("alpha", "a", "Alice"));
        let _ = recv_server_msg(&mut reader_a);
        relay.disconnect(conn_a);

        // A move event queued behind the disconnect. Session is gone.
        relay.handle_message(
            conn_a,
            ClientMessage::PlayerMove {
                position: Position { x: 1.0, z: 2.0 },
            },
        );
        assert_eq!(relay.rooms().room_count(), 0);
    }
}
