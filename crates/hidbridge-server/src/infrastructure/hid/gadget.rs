//! Linux USB HID gadget character device (`/dev/hidg0`).
//!
//! The gadget is opened write-only in blocking mode. A blocking write returns
//! once the host has polled the report, so keystrokes are never coalesced;
//! on BIOS and UEFI password prompts that accuracy matters more than latency.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hidbridge_core::HidReport;

use super::HidDevice;

/// Default gadget device path.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/hidg0";

/// The real HID gadget device.
#[derive(Debug)]
pub struct GadgetDevice {
    path: PathBuf,
    file: Option<File>,
}

impl GadgetDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the device node exists.
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }
}

impl HidDevice for GadgetDevice {
    fn open(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new().write(true).open(&self.path)?;
            self.file = Some(file);
        }
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the handle closes the descriptor; close errors on a
        // vanished gadget are not reportable anyway.
        self.file = None;
    }

    fn write_report(&mut self, report: &HidReport) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "HID device is not open")
        })?;
        file.write_all(report.as_bytes())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
