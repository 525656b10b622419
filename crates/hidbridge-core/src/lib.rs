//! # hidbridge-core
//!
//! Shared library for HID-Bridge containing the key tables, the 8-byte boot
//! keyboard report, the peer-facing wire tokens, and the action-script model.
//!
//! This crate has no dependencies on device files, sockets, GPIO, or timers.
//! Everything here is a pure function of its input, which is what lets the
//! server crate test its session logic without hardware.
//!
//! # Architecture overview
//!
//! HID-Bridge turns a small Linux board into a USB keyboard that is driven
//! remotely over a serial (RFCOMM) link.  A peer sends either a JSON command
//! script or plain text; the board types, deletes, and presses keys on the USB
//! host it is plugged into and blinks LEDs / sounds a buzzer as feedback.
//!
//! - **`keymap`** – Maps a literal character (`'a'`, `'A'`, `'!'`) or a key
//!   name (`"UP"`, `"HOME"`, `"F5"`) to a USB HID Usage ID plus the modifier
//!   bits needed to produce it on a US layout.
//!
//! - **`report`** – The 8-byte boot-keyboard report written to the gadget
//!   device, and the modifier bitmask that goes in its first byte.
//!
//! - **`protocol`** – Status tokens sent back to the peer, payload decoding
//!   (UTF-8 with a Latin-1 fallback), and the printable-text filter.
//!
//! - **`script`** – The closed [`ActionStep`] enum and the parsers that turn
//!   command lists (two JSON schemas plus the compact action code) into steps.

pub mod keymap;
pub mod protocol;
pub mod report;
pub mod script;

pub use keymap::hid::HidKeyCode;
pub use keymap::{KeyMap, KeyStroke};
pub use protocol::Reply;
pub use report::{HidReport, Modifiers, REPORT_LEN};
pub use script::{parse_script, ActionStep, ScriptError};
