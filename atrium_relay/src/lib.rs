// atrium_relay — room-based real-time state relay for Atrium.
//
// Atrium is a shared spatial session: each participant renders the scene,
// handles input, and generates audio locally; only position updates and
// zone enter/exit events cross the network. This crate is the server side
// of that exchange — a thin broker that groups connections into rooms,
// keeps each room's authoritative membership, and rebroadcasts per-player
// state changes to the other members. It is best-effort, in-memory, and
// ephemeral: nothing survives a process restart, and it never validates
// movement or identities.
//
// Module overview:
// - `registry.rs`: Session registry — which connection joined as which
//                  player, in which room.
// - `rooms.rs`:    Room directory — membership tables, member-owned
//                  connection write halves, snapshot and broadcast helpers.
// - `relay.rs`:    The `Relay` service object — message router and the
//                  connection state machine, driving registry + directory.
// - `server.rs`:   TCP listener, reader threads (one per client), and the
//                  main event loop. Uses `std::net` with a thread-per-reader
//                  architecture and an `mpsc` channel to funnel events into
//                  the single-threaded `Relay`.
// - `client.rs`:   Blocking TCP client with a background reader thread,
//                  used by the integration tests and embeddable in native
//                  frontends.
//
// Dependencies: `atrium_protocol` (shared message types and framing),
// `log` for diagnostics, `thiserror` for error enums. No async runtime —
// the whole relay is one event loop fed by reader threads.
//
// The relay runs as a standalone binary (`main.rs`) or embedded via
// `start_relay`.

pub mod client;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod server;

pub use client::{ClientError, JoinInfo, RelayClient};
pub use relay::Relay;
pub use server::{RelayConfig, RelayHandle, start_relay};
