// atrium_protocol — wire protocol for the Atrium room relay.
//
// This crate defines the message types, framing, and serialization used by
// the relay server (`atrium_relay`) and clients to communicate over TCP. It
// is shared between both sides and has no dependency on the relay itself.
//
// Module overview:
// - `types.rs`:    Identifier and coordinate types — `PlayerId`, `RoomId`,
//                  `ZoneIndex`, `Position`.
// - `message.rs`:  Client-to-relay and relay-to-client message enums, plus
//                  the `PlayerInfo` snapshot entry.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON with a string `type` tag.** The wire shape is fixed by the
//   browser frontend this relay serves: `{"type":"player_moved",...}` with
//   camelCase fields. Internally tagged serde enums produce it directly.
// - **No sender identity on movement/zone messages.** The relay resolves
//   the sender from its session registry, so clients cannot speak for each
//   other and the wire stays minimal.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with both blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{ClientMessage, PlayerInfo, ServerMessage};
pub use types::{PlayerId, Position, RoomId, ZoneIndex};
