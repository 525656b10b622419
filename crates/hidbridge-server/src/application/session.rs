//! SessionLoop: one connected peer, from greeting to disconnect.
//!
//! # State machine
//!
//! ```text
//! Handshaking ──greeting sent──▶ Active ──EOF / error / shutdown──▶ Closing ──▶ Closed
//!                                  │ ▲
//!                                  └─┘ payload → reply
//! ```
//!
//! - **Handshaking**: send `READY_FOR_AUDIT`. The peer's reply is not
//!   awaited; the session is `Active` as soon as the greeting is out.
//! - **Active**: receive up to [`MAX_PAYLOAD`] bytes at a time. Each
//!   non-blank payload is offered to the [`ActionInterpreter`]. A script is
//!   answered with `AUDIT_COMPLETE`; anything else is filtered down to its
//!   printable characters and typed, answered with `OK`, `PARTIAL_FAIL`, or
//!   `IGNORED` when nothing printable was left.
//! - **Closing**: the stream is shut down, whatever happened before.
//!
//! A failed keystroke never ends the session. Only the peer going away (EOF,
//! receive error, send error) or the process shutting down does.
//!
//! # Polling
//!
//! Receives are wrapped in a short timeout so the shared `running` flag is
//! checked regularly, the same way the accept loop does it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hidbridge_core::protocol::{decode_payload, printable_text, MAX_PAYLOAD};
use hidbridge_core::Reply;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::interpret::{ActionInterpreter, InterpretResult};

/// How long one receive waits before the shutdown flag is checked again.
const RECEIVE_POLL: Duration = Duration::from_millis(200);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Active,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed its side (empty receive).
    PeerClosed,
    /// Receiving from the peer failed.
    ReceiveFailed,
    /// Sending a token to the peer failed.
    SendFailed,
    /// The process is shutting down.
    Shutdown,
}

/// What happened during one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: Uuid,
    /// Payloads executed as scripts.
    pub scripts: usize,
    /// Payloads typed as literal text.
    pub text_payloads: usize,
    /// Payloads answered with `IGNORED`.
    pub ignored_payloads: usize,
    pub end: SessionEnd,
}

/// Per-connection loop over any bidirectional byte stream.
pub struct SessionLoop<'a, S> {
    id: Uuid,
    stream: Option<S>,
    interpreter: &'a mut ActionInterpreter,
    running: Arc<AtomicBool>,
    state: SessionState,
    scripts: usize,
    text_payloads: usize,
    ignored_payloads: usize,
}

impl<'a, S> SessionLoop<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, interpreter: &'a mut ActionInterpreter, running: Arc<AtomicBool>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: Some(stream),
            interpreter,
            running,
            state: SessionState::Handshaking,
            scripts: 0,
            text_payloads: 0,
            ignored_payloads: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion and closes the stream.
    pub async fn run(&mut self) -> SessionSummary {
        info!("session {} started", self.id);
        let end = self.drive().await;
        self.state = SessionState::Closing;
        self.close().await;

        let summary = SessionSummary {
            id: self.id,
            scripts: self.scripts,
            text_payloads: self.text_payloads,
            ignored_payloads: self.ignored_payloads,
            end,
        };
        info!(
            "session {} ended ({:?}): {} scripts, {} text payloads, {} ignored",
            self.id, end, summary.scripts, summary.text_payloads, summary.ignored_payloads
        );
        summary
    }

    /// Shuts the stream down. Only the first call touches the stream.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("session {}: shutdown: {e}", self.id);
            }
            debug!("session {}: connection released", self.id);
        }
        self.state = SessionState::Closed;
    }

    async fn drive(&mut self) -> SessionEnd {
        if let Err(e) = self.send(Reply::ReadyForAudit).await {
            warn!("session {}: greeting failed: {e}", self.id);
            return SessionEnd::SendFailed;
        }
        self.state = SessionState::Active;

        let mut buf = vec![0u8; MAX_PAYLOAD];
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return SessionEnd::Shutdown;
            }
            let Some(stream) = self.stream.as_mut() else {
                return SessionEnd::PeerClosed;
            };

            let n = match timeout(RECEIVE_POLL, stream.read(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    info!("session {}: peer disconnected", self.id);
                    return SessionEnd::PeerClosed;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!("session {}: receive failed: {e}", self.id);
                    return SessionEnd::ReceiveFailed;
                }
            };

            let payload = decode_payload(&buf[..n]);
            if payload.trim().is_empty() {
                continue;
            }

            let reply = self.handle_payload(&payload).await;
            if let Err(e) = self.send(reply).await {
                warn!("session {}: peer lost during send: {e}", self.id);
                return SessionEnd::SendFailed;
            }
        }
    }

    async fn handle_payload(&mut self, payload: &str) -> Reply {
        if let InterpretResult::Executed(count) = self.interpreter.interpret(payload).await {
            debug!("session {}: script of {count} steps done", self.id);
            self.scripts += 1;
            return Reply::AuditComplete;
        }

        let text = printable_text(payload);
        if text.is_empty() {
            self.ignored_payloads += 1;
            return Reply::Ignored;
        }

        info!("typing literal text ({} characters)", text.chars().count());
        self.text_payloads += 1;
        let outcome = self.interpreter.keyboard_mut().type_string(&text).await;
        if outcome.is_complete() {
            Reply::Ok
        } else {
            Reply::PartialFail
        }
    }

    async fn send(&mut self, reply: Reply) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        stream.write_all(reply.as_bytes()).await?;
        stream.flush().await?;
        debug!("session {}: sent {reply}", self.id);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::keyboard::{KeyboardDriver, KeyboardTiming};
    use crate::infrastructure::effector::simulated::SimulatedEffector;
    use crate::infrastructure::hid::recording::{InjectedFault, RecordingDevice, ReportLog};
    use crate::infrastructure::hid::{HidTransport, TransportTiming};
    use tokio_test::io::Builder;

    fn interpreter() -> (ActionInterpreter, ReportLog) {
        let device = RecordingDevice::new();
        let log = device.log();
        let transport = HidTransport::new(Box::new(device), TransportTiming::default());
        let keyboard = KeyboardDriver::new(transport, KeyboardTiming::default());
        (
            ActionInterpreter::new(keyboard, Arc::new(SimulatedEffector::new())),
            log,
        )
    }

    fn running() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(true))
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_then_peer_close() {
        // Arrange
        let (mut interp, _log) = interpreter();
        let stream = Builder::new().write(b"READY_FOR_AUDIT").build();
        let mut session = SessionLoop::new(stream, &mut interp, running());
        assert_eq!(session.state(), SessionState::Handshaking);

        // Act
        let summary = session.run().await;

        // Assert
        assert_eq!(summary.end, SessionEnd::PeerClosed);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whitespace_payload_gets_no_reply() {
        let (mut interp, log) = interpreter();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read(b" \r\n\t ")
            .build();

        let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

        assert_eq!(summary.end, SessionEnd::PeerClosed);
        assert_eq!(summary.text_payloads + summary.ignored_payloads, 0);
        assert!(log.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_only_payload_is_ignored() {
        let (mut interp, log) = interpreter();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read(b"\x07\x1b")
            .write(b"IGNORED")
            .build();

        let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

        assert_eq!(summary.ignored_payloads, 1);
        assert!(log.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_format_only_payload_is_ignored() {
        // Arrange: zero-width space and BOM in UTF-8, then a lone Latin-1
        // soft hyphen.
        let (mut interp, log) = interpreter();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read("\u{200b}\u{feff}".as_bytes())
            .write(b"IGNORED")
            .read(b"\xad")
            .write(b"IGNORED")
            .build();

        // Act
        let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

        // Assert
        assert_eq!(summary.ignored_payloads, 2);
        assert_eq!(summary.text_payloads, 0);
        assert!(log.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partially_typed_text_replies_partial_fail() {
        // Arrange: the first keystroke fails outright.
        let (mut interp, log) = interpreter();
        log.inject_write_fault(InjectedFault::Os(5));
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read(b"ab")
            .write(b"PARTIAL_FAIL")
            .build();

        // Act
        let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

        // Assert
        assert_eq!(summary.text_payloads, 1);
        assert_eq!(log.typed_text(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_latin1_payload_is_typed_after_filtering() {
        // 0xE9 alone is not UTF-8; as Latin-1 it is 'é', which has no key.
        let (mut interp, log) = interpreter();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read(b"x\xe9")
            .write(b"PARTIAL_FAIL")
            .build();

        SessionLoop::new(stream, &mut interp, running()).run().await;

        assert_eq!(log.typed_text(), "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_ends_session() {
        let (mut interp, _log) = interpreter();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();

        let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

        assert_eq!(summary.end, SessionEnd::ReceiveFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_error_ends_session() {
        let (mut interp, _log) = interpreter();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .read(b"hi")
            .write_error(io::Error::from(io::ErrorKind::BrokenPipe))
            .build();

        let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

        assert_eq!(summary.end, SessionEnd::SendFailed);
        assert_eq!(summary.text_payloads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_running_flag_stops_session() {
        // Arrange
        let (mut interp, _log) = interpreter();
        let flag = running();
        let stream = Builder::new()
            .write(b"READY_FOR_AUDIT")
            .wait(Duration::from_secs(5))
            .build();
        let stopper = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            stopper.store(false, Ordering::Relaxed);
        });

        // Act
        let summary = SessionLoop::new(stream, &mut interp, flag).run().await;

        // Assert
        assert_eq!(summary.end, SessionEnd::Shutdown);
    }
}
