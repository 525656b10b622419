//! The 8-byte USB boot-keyboard input report.
//!
//! Wire layout written to the gadget device:
//! ```text
//! [modifier:1][reserved:1][key1:1][key2:1][key3:1][key4:1][key5:1][key6:1]
//! ```
//! HID-Bridge only ever populates `key1`; the remaining five slots stay zero.
//! An all-zero report means "no keys held" and is sent after every press.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::keymap::hid::HidKeyCode;

/// Size of a boot-keyboard report in bytes.
pub const REPORT_LEN: usize = 8;

/// Modifier byte of the boot-keyboard report.
///
/// Bit order is fixed by the HID boot protocol (byte 0 of the report).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0x00);
    pub const LEFT_CTRL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const LEFT_GUI: u8 = 0x08;
    pub const RIGHT_CTRL: u8 = 0x10;
    pub const RIGHT_SHIFT: u8 = 0x20;
    pub const RIGHT_ALT: u8 = 0x40;
    pub const RIGHT_GUI: u8 = 0x80;

    /// Left Shift only; the modifier used for every shifted character.
    pub const SHIFT: Modifiers = Modifiers(Self::LEFT_SHIFT);

    /// Returns the raw modifier byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if either Shift modifier is active.
    pub fn shift(self) -> bool {
        self.0 & (Self::LEFT_SHIFT | Self::RIGHT_SHIFT) != 0
    }

    /// Returns `true` if either Ctrl modifier is active.
    pub fn ctrl(self) -> bool {
        self.0 & (Self::LEFT_CTRL | Self::RIGHT_CTRL) != 0
    }

    /// Returns `true` if either Alt modifier is active.
    pub fn alt(self) -> bool {
        self.0 & (Self::LEFT_ALT | Self::RIGHT_ALT) != 0
    }

    /// Returns `true` if either GUI (Win/Cmd/Super) modifier is active.
    pub fn gui(self) -> bool {
        self.0 & (Self::LEFT_GUI | Self::RIGHT_GUI) != 0
    }
}

/// One boot-keyboard report, created per press or release and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HidReport([u8; REPORT_LEN]);

impl HidReport {
    /// The canonical "all keys released" report.
    pub const RELEASE: HidReport = HidReport([0; REPORT_LEN]);

    /// Builds a report with a single key held under `modifiers`.
    pub fn press(key: HidKeyCode, modifiers: Modifiers) -> Self {
        HidReport([modifiers.bits(), 0, key.as_u8(), 0, 0, 0, 0, 0])
    }

    /// Returns the all-zero release report.
    pub fn release() -> Self {
        Self::RELEASE
    }

    /// Wraps raw report bytes, e.g. when replaying a recorded report.
    pub fn from_bytes(bytes: [u8; REPORT_LEN]) -> Self {
        HidReport(bytes)
    }

    /// The bytes exactly as written to the device.
    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    /// Modifier byte (report byte 0).
    pub fn modifiers(&self) -> Modifiers {
        Modifiers(self.0[0])
    }

    /// Key in the first keycode slot, if any.
    pub fn key(&self) -> Option<HidKeyCode> {
        HidKeyCode::from_u8(self.0[2])
    }

    /// Returns `true` for the all-zero release report.
    pub fn is_release(&self) -> bool {
        self.0 == [0; REPORT_LEN]
    }

    /// Lowercase hex rendering used when logging test-mode writes.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for HidReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
