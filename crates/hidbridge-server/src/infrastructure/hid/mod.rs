//! HID transport: writes boot-keyboard reports to the gadget device.
//!
//! # Retry and recovery
//!
//! Every physical write goes through [`HidTransport::write_report`], which
//! sorts failures into three classes:
//!
//! | Condition                         | Action                                  |
//! |-----------------------------------|-----------------------------------------|
//! | `EAGAIN` / would block            | sleep `busy_backoff`, retry             |
//! | `ESHUTDOWN` (endpoint reset)      | close, sleep `reset_backoff`, reopen, retry |
//! | anything else                     | fail immediately                        |
//!
//! At most `max_retries` attempts are made in total. Opening the device on a
//! closed handle counts as part of the attempt and is classified the same way.
//!
//! # Device state
//!
//! The handle is either [`DeviceState::Closed`] or [`DeviceState::Open`].
//! It opens lazily on the first write, closes on a transport reset (and is
//! reopened by the next attempt if the immediate reopen failed), and closes
//! when the transport is shut down or dropped.
//!
//! # Test mode
//!
//! The transport never knows whether it is live. Test mode is simply a
//! [`recording::RecordingDevice`] in place of a [`gadget::GadgetDevice`]; the
//! retry loop, timing, and state transitions are identical.

pub mod gadget;
pub mod recording;

use std::io;
use std::time::Duration;

use hidbridge_core::{HidKeyCode, HidReport, KeyStroke, Modifiers};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// `EAGAIN`: resource temporarily unavailable (gadget buffer full).
pub const EAGAIN: i32 = 11;

/// `ESHUTDOWN`: cannot send after transport endpoint shutdown (cable pulled,
/// gadget driver reset).
pub const ESHUTDOWN: i32 = 108;

/// Error type for report writes.
#[derive(Debug, Error)]
pub enum HidError {
    /// An I/O error that retrying cannot fix.
    #[error("unrecoverable HID I/O error: {source}")]
    Unrecoverable {
        #[source]
        source: io::Error,
    },

    /// Every attempt hit a transient or reset condition.
    #[error("HID write failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// A character device that accepts 8-byte boot-keyboard reports.
///
/// Implementations are synchronous; the transport is the only caller and
/// never issues two writes at once.
pub trait HidDevice: Send {
    /// Opens the device. Opening an already-open device is a no-op.
    fn open(&mut self) -> io::Result<()>;

    /// Closes the device. Errors are ignored; closing twice is a no-op.
    fn close(&mut self);

    /// Writes one report.
    fn write_report(&mut self, report: &HidReport) -> io::Result<()>;

    /// Human-readable identity for logs (usually the device path).
    fn describe(&self) -> String;
}

/// Open/closed state of the device handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Open,
}

/// Delays and retry budget of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTiming {
    /// Pause after each press and each release report.
    pub report_hold: Duration,
    /// Pause before retrying a write that would block.
    pub busy_backoff: Duration,
    /// Pause between closing and reopening after a transport reset.
    pub reset_backoff: Duration,
    /// Total number of write attempts per report. Values below one are
    /// raised to one by [`HidTransport::new`].
    pub max_retries: u32,
}

impl Default for TransportTiming {
    fn default() -> Self {
        Self {
            report_hold: Duration::from_millis(30),
            busy_backoff: Duration::from_millis(50),
            reset_backoff: Duration::from_millis(100),
            max_retries: 5,
        }
    }
}

/// How a failed attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Busy,
    Reset,
    Fatal,
}

fn classify(err: &io::Error) -> Fault {
    if err.kind() == io::ErrorKind::WouldBlock {
        return Fault::Busy;
    }
    match err.raw_os_error() {
        Some(EAGAIN) => Fault::Busy,
        Some(ESHUTDOWN) => Fault::Reset,
        _ => Fault::Fatal,
    }
}

/// Exclusive owner of the HID device handle.
pub struct HidTransport {
    device: Box<dyn HidDevice>,
    state: DeviceState,
    timing: TransportTiming,
}

impl HidTransport {
    /// Creates a transport with the device closed.
    pub fn new(device: Box<dyn HidDevice>, timing: TransportTiming) -> Self {
        Self {
            device,
            state: DeviceState::Closed,
            timing: TransportTiming {
                max_retries: timing.max_retries.max(1),
                ..timing
            },
        }
    }

    /// Current handle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn timing(&self) -> &TransportTiming {
        &self.timing
    }

    /// Opens the device now instead of on the first write.
    ///
    /// Used at start-up so a missing or inaccessible device is reported before
    /// any session begins.
    ///
    /// # Errors
    ///
    /// Returns [`HidError::Unrecoverable`] if the device cannot be opened.
    pub fn open(&mut self) -> Result<(), HidError> {
        self.ensure_open()
            .map_err(|source| HidError::Unrecoverable { source })
    }

    /// Closes the device handle. Safe to call when already closed.
    pub fn close(&mut self) {
        if self.state == DeviceState::Open {
            self.device.close();
            self.state = DeviceState::Closed;
            info!("HID device {} closed", self.device.describe());
        }
    }

    /// Sends one key press followed by the release report.
    ///
    /// Each report is followed by `report_hold`, which slow firmware input
    /// parsers (BIOS setup screens in particular) need to register the key.
    /// If the press cannot be written the release is not attempted.
    ///
    /// # Errors
    ///
    /// Returns the [`HidError`] of the first report that could not be written.
    pub async fn send_key(&mut self, key: HidKeyCode, modifiers: Modifiers) -> Result<(), HidError> {
        self.write_report(&HidReport::press(key, modifiers)).await?;
        sleep(self.timing.report_hold).await;

        self.write_report(&HidReport::release()).await?;
        sleep(self.timing.report_hold).await;
        Ok(())
    }

    /// [`send_key`](Self::send_key) for a resolved [`KeyStroke`].
    pub async fn send_stroke(&mut self, stroke: KeyStroke) -> Result<(), HidError> {
        self.send_key(stroke.code, stroke.modifiers).await
    }

    /// Writes one report, retrying transient and reset conditions.
    ///
    /// # Errors
    ///
    /// - [`HidError::Unrecoverable`] on the first error that is neither busy
    ///   nor a transport reset.
    /// - [`HidError::RetriesExhausted`] once `max_retries` attempts have failed.
    pub async fn write_report(&mut self, report: &HidReport) -> Result<(), HidError> {
        let max = self.timing.max_retries;

        for attempt in 1..=max {
            let err = match self.try_write(report) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            match classify(&err) {
                Fault::Busy => {
                    debug!("HID buffer full (attempt {attempt}/{max}); backing off");
                    sleep(self.timing.busy_backoff).await;
                }
                Fault::Reset => {
                    warn!("HID transport reset (attempt {attempt}/{max}): {err}; reopening");
                    self.close();
                    sleep(self.timing.reset_backoff).await;
                    if let Err(e) = self.ensure_open() {
                        debug!("reopen after reset failed: {e}; will retry on next attempt");
                    }
                }
                Fault::Fatal => {
                    warn!("HID write failed: {err}");
                    return Err(HidError::Unrecoverable { source: err });
                }
            }
        }

        warn!("HID write failed after {max} attempts");
        Err(HidError::RetriesExhausted { attempts: max })
    }

    fn try_write(&mut self, report: &HidReport) -> io::Result<()> {
        self.ensure_open()?;
        self.device.write_report(report)
    }

    fn ensure_open(&mut self) -> io::Result<()> {
        if self.state == DeviceState::Closed {
            self.device.open()?;
            self.state = DeviceState::Open;
            debug!("HID device {} opened", self.device.describe());
        }
        Ok(())
    }
}

impl Drop for HidTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
