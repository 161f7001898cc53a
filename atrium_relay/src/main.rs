// CLI entry point for the Atrium room relay.
//
// Starts a standalone relay that frontends connect to. The relay groups
// connections into rooms and rebroadcasts position and zone events — it
// never runs any scene logic. See `server.rs` for the networking
// architecture and `relay.rs` for the state model.
//
// Configuration: the listening port comes from the `PORT` environment
// variable (default 8080); a `--port` flag overrides it. Logging is
// controlled via `RUST_LOG` (env_logger).
//
// Usage:
//   relay [OPTIONS]
//     --port <PORT>    Listen port (default: $PORT or 8080)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use atrium_relay::server::{RelayConfig, start_relay};

fn main() {
    env_logger::init();

    let config = parse_args();

    let (handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    println!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // The relay threads run until the process is killed. SIGINT/SIGTERM
    // terminate the process, which is fine for an ephemeral broker with no
    // state to flush — see `ctrlc_wait` for the graceful-shutdown story.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc_wait(running_clone);

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!("\nShutting down...");
    handle.stop();
}

/// Block until Ctrl+C is pressed, then set the flag to false.
fn ctrlc_wait(running: Arc<AtomicBool>) {
    // The process exits on SIGINT/SIGTERM by default, which is acceptable
    // for an in-memory relay with nothing to flush. A proper handler would
    // use the `ctrlc` crate and call `handle.stop()`; until a deployment
    // needs drain-before-exit semantics, the default signal disposition
    // does the job and keeps dependencies minimal.
    let _ = running;
}

/// Parse command-line arguments into a `RelayConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();

    // Environment first, flags second, so `--port` wins over `$PORT`.
    if let Ok(port) = std::env::var("PORT") {
        config.port = port.parse().unwrap_or_else(|_| {
            eprintln!("PORT must be a valid port number, got: {port}");
            std::process::exit(1);
        });
    }

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>    Listen port (default: $PORT or 8080)");
    println!("  --help, -h       Show this help");
}
