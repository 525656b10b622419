//! Accept loop for peer connections.
//!
//! The serial Bluetooth link is exposed to this process as a stream socket
//! (an RFCOMM bridge such as `rfcomm watch` or a TCP forwarder), so the loop
//! only needs a bound [`TcpListener`]. Binding and pairing happen outside.
//!
//! Connections are served one at a time: a session runs to completion inline
//! before the next `accept`. There is exactly one keyboard, and two peers
//! typing into it at once would interleave their keystrokes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tracing::{error, info};

use crate::application::interpret::ActionInterpreter;
use crate::application::session::SessionLoop;

/// How long one `accept` waits before the shutdown flag is checked again.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Pause after a failed `accept`.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Counters kept across sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_served: u64,
    pub scripts_executed: u64,
}

/// Serves peers on `listener` until `running` is cleared.
///
/// Accept errors are logged and retried after a short pause; they never stop
/// the server.
pub async fn run_server(
    listener: TcpListener,
    interpreter: &mut ActionInterpreter,
    running: Arc<AtomicBool>,
) -> ServerStats {
    let mut stats = ServerStats::default();
    match listener.local_addr() {
        Ok(addr) => info!("waiting for connections on {addr}"),
        Err(_) => info!("waiting for connections"),
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("peer connected: {peer_addr}");
                stats.connections_served += 1;

                let summary = SessionLoop::new(stream, interpreter, Arc::clone(&running))
                    .run()
                    .await;

                stats.scripts_executed = interpreter.scripts_executed();
                info!(
                    "session {} with {peer_addr} over; {} connections served, {} scripts executed",
                    summary.id, stats.connections_served, stats.scripts_executed
                );
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
                sleep(ACCEPT_ERROR_BACKOFF).await;
            }
            // No connection in the last poll interval.
            Err(_) => {}
        }
    }

    stats
}
