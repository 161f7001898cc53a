// Test-only participant for relay integration tests.
//
// Wraps the real `RelayClient` (from `atrium_relay::client`) to provide a
// synchronous, test-friendly API for exercising the full relay pipeline:
// join → broadcast → observe on the other side. The only test-specific
// code is the blocking wrappers around `RelayClient::poll()` — all
// networking uses the same code paths as a real frontend.
//
// See `tests/full_session.rs` for the scenarios.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use atrium_protocol::message::ServerMessage;
use atrium_protocol::types::{PlayerId, Position, RoomId, ZoneIndex};
use atrium_relay::client::{JoinInfo, RelayClient};

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Window used when asserting that no message arrives.
const SILENCE_WINDOW: Duration = Duration::from_millis(150);

/// A test participant wrapping a real RelayClient, buffering inbound
/// messages so tests can consume them one at a time in delivery order.
pub struct TestPlayer {
    client: RelayClient,
    pending: VecDeque<ServerMessage>,
}

impl TestPlayer {
    /// Connect to a relay and join `room` as `player`. Returns the
    /// participant and the roster from the join acknowledgment.
    pub fn join(addr: SocketAddr, room: &str, player: &str, name: &str) -> (Self, JoinInfo) {
        let target = format!("127.0.0.1:{}", addr.port());
        let (client, info) = RelayClient::join_room(
            &target,
            RoomId(room.into()),
            PlayerId(player.into()),
            name,
        )
        .expect("TestPlayer::join failed");
        (
            Self {
                client,
                pending: VecDeque::new(),
            },
            info,
        )
    }

    pub fn send_move(&mut self, x: f64, z: f64) {
        self.client
            .send_move(Position { x, z })
            .expect("send_move failed");
    }

    pub fn send_zone_entered(&mut self, zone: u32) {
        self.client
            .send_zone_entered(ZoneIndex(zone))
            .expect("send_zone_entered failed");
    }

    pub fn send_zone_exited(&mut self, zone: u32) {
        self.client
            .send_zone_exited(ZoneIndex(zone))
            .expect("send_zone_exited failed");
    }

    /// Send a raw frame, bypassing the typed message API.
    pub fn send_raw(&mut self, payload: &[u8]) {
        self.client.send_raw(payload).expect("send_raw failed");
    }

    /// Blocking: return the next server message in delivery order.
    pub fn next_message(&mut self) -> ServerMessage {
        let start = Instant::now();
        loop {
            self.pending.extend(self.client.poll());
            if let Some(msg) = self.pending.pop_front() {
                return msg;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for a server message"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Assert that nothing arrives within a short window.
    pub fn assert_silent(&mut self) {
        thread::sleep(SILENCE_WINDOW);
        self.pending.extend(self.client.poll());
        assert!(
            self.pending.is_empty(),
            "expected silence, got: {:?}",
            self.pending
        );
    }

    /// Close the connection; the relay sees a transport close.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }
}
