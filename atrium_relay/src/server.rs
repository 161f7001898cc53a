// TCP server and main event loop for the room relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): call `framing::read_message()` in a
//   loop, deserialize `ClientMessage`, and send `InternalEvent::MessageFrom`
//   to the main thread. On read error/EOF, send `InternalEvent::Disconnected`
//   and stop. A frame that fails to deserialize is logged and skipped — the
//   connection stays open (the length prefix keeps the stream in sync).
// - **Main thread**: owns the `Relay`, receives events from the channel, and
//   dispatches them one at a time to completion. This is the single logical
//   thread of control: no handler ever observes another handler's partial
//   effects, and messages from one connection are handled in the order its
//   reader produced them.
//
// The main thread is the only writer to client TCP streams (via the room
// directory's member writers). Reader threads only read from streams. This
// avoids concurrent read/write on the same `TcpStream`, which is safe on
// most platforms but fragile.
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `RelayHandle::stop`) on a short `recv_timeout` and breaks out of the
// event loop.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use atrium_protocol::framing::read_message;
use atrium_protocol::message::ClientMessage;

use crate::registry::ConnId;
use crate::relay::Relay;

/// How often the event loop wakes to re-check the shutdown flag when no
/// events are arriving.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection { stream: TcpStream },
    MessageFrom { conn: ConnId, message: ClientMessage },
    Disconnected { conn: ConnId },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
pub struct RelayConfig {
    /// Listening port, bound on all interfaces. 0 lets the OS pick.
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> std::io::Result<(RelayHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    log::info!("relay listening on {addr}");

    let thread = thread::spawn(move || {
        run_relay(listener, &keep_running_clone);
    });

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(listener: TcpListener, keep_running: &Arc<AtomicBool>) {
    let mut relay = Relay::new();
    let mut next_conn_id: u64 = 0;

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Set the listener to non-blocking so the accept thread can check
    // keep_running periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    log::info!("new connection from {peer}");
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    log::error!("accept failed: {e}");
                    break;
                }
            }
        }
    });

    // Main event loop. The timeout only exists so the shutdown flag is
    // re-checked while idle — there is no periodic work.
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(event) => {
                handle_event(&mut relay, &mut next_conn_id, event, &tx, keep_running);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut relay, &mut next_conn_id, event, &tx, keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Dispatch a single event to the relay.
fn handle_event(
    relay: &mut Relay,
    next_conn_id: &mut u64,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            let conn = ConnId(*next_conn_id);
            *next_conn_id += 1;
            handle_new_connection(relay, conn, stream, tx, keep_running);
        }
        InternalEvent::MessageFrom { conn, message } => {
            relay.handle_message(conn, message);
        }
        InternalEvent::Disconnected { conn } => {
            relay.disconnect(conn);
        }
    }
}

/// Handle a new TCP connection: hand the write half to the relay (the
/// connection starts in the Unjoined state) and spawn a reader thread for
/// the read half.
fn handle_new_connection(
    relay: &mut Relay,
    conn: ConnId,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    let write_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            log::warn!("failed to clone stream for {conn:?}: {e}");
            return;
        }
    };
    relay.add_connection(conn, write_stream);

    let tx_reader = tx.clone();
    let keep_running_reader = keep_running.clone();
    thread::spawn(move || {
        reader_loop(BufReader::new(stream), conn, &tx_reader, &keep_running_reader);
    });
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    conn: ConnId,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_message(&mut reader) {
            Ok(bytes) => match serde_json::from_slice::<ClientMessage>(&bytes) {
                Ok(message) => {
                    let _ = tx.send(InternalEvent::MessageFrom { conn, message });
                }
                Err(e) => {
                    // Malformed payload — discard the frame, keep the
                    // connection. Framing already re-synchronized us.
                    log::warn!("malformed message on {conn:?}: {e}");
                }
            },
            Err(_) => {
                // Read error or EOF — the connection is gone.
                let _ = tx.send(InternalEvent::Disconnected { conn });
                break;
            }
        }
    }
}
