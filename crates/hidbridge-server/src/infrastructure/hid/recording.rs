//! Test-mode HID device that records reports instead of writing them.
//!
//! # Why a recording device?
//!
//! The gadget device only exists on a board wired up as a USB peripheral, and
//! what it "types" lands on a different machine. `RecordingDevice` replaces
//! the write with an in-memory append and an `info!` line showing the report
//! in hex, so the whole stack (session, interpreter, driver, transport) runs
//! unchanged on a development machine.
//!
//! # Shared log
//!
//! The device is boxed into the transport, so tests keep a [`ReportLog`]
//! clone to inspect what was written and to queue faults:
//!
//! ```ignore
//! let device = RecordingDevice::new();
//! let log = device.log();
//! log.inject_write_fault(InjectedFault::WouldBlock);
//! let mut transport = HidTransport::new(Box::new(device), TransportTiming::default());
//!
//! transport.send_key(HidKeyCode::KeyA, Modifiers::NONE).await?;
//! assert_eq!(log.write_attempts(), 3); // busy, press, release
//! ```
//!
//! Only the most recent [`DEFAULT_CAPACITY`] reports are kept, since test
//! mode also backs a long-running `serve`. Counters are never trimmed.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hidbridge_core::{HidReport, KeyMap, KeyStroke};
use tracing::info;

use super::{HidDevice, ESHUTDOWN};

/// A failure to produce on the next open or write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// `io::ErrorKind::WouldBlock`.
    WouldBlock,
    /// `ESHUTDOWN`, as after a USB reset.
    TransportShutdown,
    /// An arbitrary errno.
    Os(i32),
}

impl InjectedFault {
    fn into_error(self) -> io::Error {
        match self {
            InjectedFault::WouldBlock => io::Error::from(io::ErrorKind::WouldBlock),
            InjectedFault::TransportShutdown => io::Error::from_raw_os_error(ESHUTDOWN),
            InjectedFault::Os(errno) => io::Error::from_raw_os_error(errno),
        }
    }
}

/// Reports kept by [`RecordingDevice::new`].
pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug)]
struct LogState {
    reports: VecDeque<HidReport>,
    capacity: usize,
    write_attempts: usize,
    opens: usize,
    closes: usize,
    write_faults: VecDeque<Option<InjectedFault>>,
    open_faults: VecDeque<InjectedFault>,
}

impl LogState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            reports: VecDeque::new(),
            capacity: capacity.max(1),
            write_attempts: 0,
            opens: 0,
            closes: 0,
            write_faults: VecDeque::new(),
            open_faults: VecDeque::new(),
        }
    }

    fn record(&mut self, report: HidReport) {
        if self.reports.len() == self.capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }
}

impl Default for LogState {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

/// Cloneable view of everything a [`RecordingDevice`] saw.
#[derive(Debug, Clone, Default)]
pub struct ReportLog {
    state: Arc<Mutex<LogState>>,
}

impl ReportLog {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The retained reports, oldest first.
    pub fn reports(&self) -> Vec<HidReport> {
        self.lock().reports.iter().copied().collect()
    }

    /// Written reports that press a key (everything except releases).
    pub fn presses(&self) -> Vec<HidReport> {
        self.lock()
            .reports
            .iter()
            .filter(|r| !r.is_release())
            .copied()
            .collect()
    }

    /// Text produced by the recorded presses, on a US layout.
    ///
    /// Presses that do not type a character (arrows, Backspace, Delete) are
    /// rendered as `<Name>` using the key's debug name.
    pub fn typed_text(&self) -> String {
        self.presses()
            .iter()
            .filter_map(|r| {
                let code = r.key()?;
                let stroke = KeyStroke {
                    code,
                    modifiers: r.modifiers(),
                };
                Some(match KeyMap::char_for(stroke) {
                    Some(c) => c.to_string(),
                    None => format!("<{code:?}>"),
                })
            })
            .collect()
    }

    /// Write calls made, including those that failed.
    pub fn write_attempts(&self) -> usize {
        self.lock().write_attempts
    }

    /// Successful open calls.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Close calls on an open device.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Queues a fault for a future write call.
    pub fn inject_write_fault(&self, fault: InjectedFault) {
        self.lock().write_faults.push_back(Some(fault));
    }

    /// Lets the next `count` writes through before any fault queued after
    /// this call fires.
    pub fn pass_writes(&self, count: usize) {
        let mut state = self.lock();
        state.write_faults.extend(std::iter::repeat(None).take(count));
    }

    /// Queues a fault for a future open call.
    pub fn inject_open_fault(&self, fault: InjectedFault) {
        self.lock().open_faults.push_back(fault);
    }

    /// Forgets recorded reports and counters. Queued faults are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.reports.clear();
        state.write_attempts = 0;
        state.opens = 0;
        state.closes = 0;
    }
}

/// HID device used in test mode.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    log: ReportLog,
    open: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that keeps at most `capacity` reports (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: ReportLog {
                state: Arc::new(Mutex::new(LogState::with_capacity(capacity))),
            },
            open: false,
        }
    }

    /// A handle to this device's log.
    pub fn log(&self) -> ReportLog {
        self.log.clone()
    }
}

impl HidDevice for RecordingDevice {
    fn open(&mut self) -> io::Result<()> {
        if self.open {
            return Ok(());
        }
        let mut state = self.log.lock();
        if let Some(fault) = state.open_faults.pop_front() {
            return Err(fault.into_error());
        }
        state.opens += 1;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.log.lock().closes += 1;
        }
    }

    fn write_report(&mut self, report: &HidReport) -> io::Result<()> {
        let mut state = self.log.lock();
        state.write_attempts += 1;
        if let Some(Some(fault)) = state.write_faults.pop_front() {
            return Err(fault.into_error());
        }
        if !self.open {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "recording device is not open",
            ));
        }
        info!("[test mode] send: {}", report.to_hex());
        state.record(*report);
        Ok(())
    }

    fn describe(&self) -> String {
        "test-mode recorder".to_string()
    }
}
