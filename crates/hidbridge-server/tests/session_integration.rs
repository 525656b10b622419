//! End-to-end session tests: wire bytes in, HID reports and reply tokens out.
//!
//! The peer is a scripted `tokio_test` mock stream and the keyboard is the
//! test-mode recorder, so every layer between the two runs for real.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use hidbridge_core::HidKeyCode;
use hidbridge_server::application::interpret::ActionInterpreter;
use hidbridge_server::application::keyboard::{KeyboardDriver, KeyboardTiming};
use hidbridge_server::application::session::{SessionEnd, SessionLoop, SessionState};
use hidbridge_server::infrastructure::effector::simulated::SimulatedEffector;
use hidbridge_server::infrastructure::hid::recording::{RecordingDevice, ReportLog};
use hidbridge_server::infrastructure::hid::{HidTransport, TransportTiming};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

// ── Helpers ───────────────────────────────────────────────────────────────────

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

/// A mock stream that counts how often it is shut down.
struct CountingStream {
    inner: Mock,
    shutdowns: Arc<AtomicUsize>,
}

impl AsyncRead for CountingStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountingStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_type_script_presses_h_i_and_replies_audit_complete() {
    // Arrange
    let (mut interp, log) = interpreter();
    let stream = Builder::new()
        .write(b"READY_FOR_AUDIT")
        .read(br#"[{"Command":"TYPE","Parameters":{"Text":"hi"}}]"#)
        .write(b"AUDIT_COMPLETE")
        .build();

    // Act
    let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

    // Assert
    assert_eq!(summary.scripts, 1);
    assert_eq!(summary.text_payloads, 0);
    let keys: Vec<_> = log.presses().iter().map(|r| r.key()).collect();
    assert_eq!(keys, vec![Some(HidKeyCode::KeyH), Some(HidKeyCode::KeyI)]);
    assert_eq!(log.reports().len(), 4, "each press is followed by a release");
}

#[tokio::test(start_paused = true)]
async fn test_plain_text_presses_h_i_and_replies_ok() {
    let (mut interp, log) = interpreter();
    let stream = Builder::new()
        .write(b"READY_FOR_AUDIT")
        .read(b"hi")
        .write(b"OK")
        .build();

    let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

    assert_eq!(summary.scripts, 0);
    assert_eq!(summary.text_payloads, 1);
    assert_eq!(log.typed_text(), "hi");
    assert_eq!(interp.scripts_executed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_truncated_script_is_typed_as_text() {
    // A broken array is literal text; nothing in it runs as a command.
    let (mut interp, log) = interpreter();
    let payload = br#"[{"Command":"HID","Parameters":{"Key":"UP"}}"#;
    let stream = Builder::new()
        .write(b"READY_FOR_AUDIT")
        .read(payload)
        .write(b"OK")
        .build();

    SessionLoop::new(stream, &mut interp, running()).run().await;

    assert_eq!(log.typed_text(), std::str::from_utf8(payload).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_several_payloads_in_one_session() {
    let (mut interp, log) = interpreter();
    let stream = Builder::new()
        .write(b"READY_FOR_AUDIT")
        .read(b"ab")
        .write(b"OK")
        .read(br#"[{"cmd":"HID","params":{"action":"DELETE","count":2}}]"#)
        .write(b"AUDIT_COMPLETE")
        .read(b"c\n")
        .write(b"OK")
        .build();

    let summary = SessionLoop::new(stream, &mut interp, running()).run().await;

    assert_eq!(summary.scripts, 1);
    assert_eq!(summary.text_payloads, 2);
    assert_eq!(log.typed_text(), "ab<Backspace><Backspace>c\n");
}

#[tokio::test(start_paused = true)]
async fn test_empty_receive_closes_exactly_once() {
    // Arrange
    let (mut interp, _log) = interpreter();
    let shutdowns = Arc::new(AtomicUsize::new(0));
    let stream = CountingStream {
        inner: Builder::new().write(b"READY_FOR_AUDIT").build(),
        shutdowns: Arc::clone(&shutdowns),
    };
    let mut session = SessionLoop::new(stream, &mut interp, running());

    // Act
    let summary = session.run().await;
    session.close().await;

    // Assert
    assert_eq!(summary.end, SessionEnd::PeerClosed);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}
