// TCP client for connecting to the room relay.
//
// Provides a non-blocking interface for a frontend's main thread to
// communicate with the relay. Architecture:
// - `create_room()` / `join_room()` perform TCP connect + the join exchange
//   on the calling thread, then spawn a background reader thread.
// - The reader thread calls `read_message()` in a loop, deserializes
//   `ServerMessage`, and pushes into an `mpsc` channel.
// - The main thread holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued messages.
//
// This separation ensures the caller never blocks on network I/O after the
// initial join. This module lives in the relay crate because it is purely
// std TCP + protocol framing + mpsc — integration tests (and any native
// frontend) can use it without extra dependencies.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use atrium_protocol::framing::{read_message, write_message};
use atrium_protocol::message::{ClientMessage, PlayerInfo, ServerMessage};
use atrium_protocol::types::{PlayerId, Position, RoomId, ZoneIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed server message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected reply while joining: {0:?}")]
    UnexpectedReply(ServerMessage),
}

/// Roster returned by a successful join exchange.
pub struct JoinInfo {
    pub room_id: RoomId,
    pub players: Vec<PlayerInfo>,
}

/// TCP client for relay communication.
pub struct RelayClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Connect and create a room. Server-side this is the same operation
    /// as `join_room`; the two entry points mirror the two wire kinds.
    pub fn create_room(
        addr: &str,
        room_id: RoomId,
        player_id: PlayerId,
        player_name: &str,
    ) -> Result<(Self, JoinInfo), ClientError> {
        Self::connect_with(
            addr,
            &ClientMessage::CreateRoom {
                room_id,
                player_id,
                player_name: player_name.into(),
            },
        )
    }

    /// Connect and join an existing (or not-yet-existing) room.
    pub fn join_room(
        addr: &str,
        room_id: RoomId,
        player_id: PlayerId,
        player_name: &str,
    ) -> Result<(Self, JoinInfo), ClientError> {
        Self::connect_with(
            addr,
            &ClientMessage::JoinRoom {
                room_id,
                player_id,
                player_name: player_name.into(),
            },
        )
    }

    /// TCP connect, send the join message, wait for `room_joined`, spawn
    /// the reader thread.
    fn connect_with(addr: &str, join: &ClientMessage) -> Result<(Self, JoinInfo), ClientError> {
        let stream = TcpStream::connect(addr)?;

        // Time-box the join exchange so a dead relay doesn't hang us.
        stream.set_read_timeout(Some(Duration::from_secs(5))).ok();

        let reader_stream = stream.try_clone()?;
        let mut writer = BufWriter::new(stream);
        let mut reader = BufReader::new(reader_stream);

        send_msg(&mut writer, join)?;

        // The relay acknowledges the join before broadcasting anything to
        // this connection, so the first inbound message is room_joined.
        let response_bytes = read_message(&mut reader)?;
        let response: ServerMessage = serde_json::from_slice(&response_bytes)?;
        let info = match response {
            ServerMessage::RoomJoined { room_id, players } => JoinInfo { room_id, players },
            other => return Err(ClientError::UnexpectedReply(other)),
        };

        // Clear the read timeout for the long-lived reader loop.
        if let Ok(inner) = reader.get_ref().try_clone() {
            inner.set_read_timeout(None).ok();
        }

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, &tx);
        });

        Ok((
            Self {
                writer,
                inbox: rx,
                _reader_thread: Some(reader_thread),
            },
            info,
        ))
    }

    /// Report a new position.
    pub fn send_move(&mut self, position: Position) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::PlayerMove { position })
    }

    /// Report entering a zone.
    pub fn send_zone_entered(&mut self, zone_index: ZoneIndex) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::ZoneEntered { zone_index })
    }

    /// Report exiting a zone.
    pub fn send_zone_exited(&mut self, zone_index: ZoneIndex) -> Result<(), ClientError> {
        send_msg(&mut self.writer, &ClientMessage::ZoneExited { zone_index })
    }

    /// Send a pre-encoded frame as-is. Lets tests exercise the relay with
    /// payloads the typed API cannot produce (unknown kinds, broken JSON).
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        write_message(&mut self.writer, payload)?;
        Ok(())
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Close the connection. The protocol has no goodbye message — the
    /// relay observes the transport close and cleans up.
    pub fn disconnect(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

/// Serialize a `ClientMessage` to JSON and write with length-delimited framing.
fn send_msg(writer: &mut BufWriter<TcpStream>, msg: &ClientMessage) -> Result<(), ClientError> {
    let json = serde_json::to_vec(msg)?;
    write_message(writer, &json)?;
    Ok(())
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: &mpsc::Sender<ServerMessage>) {
    while let Ok(bytes) = read_message(&mut reader) {
        match serde_json::from_slice::<ServerMessage>(&bytes) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Main thread dropped the receiver
                }
            }
            Err(_) => break, // Malformed message
        }
    }
}
