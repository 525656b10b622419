//! Application layer for the HID-Bridge server.
//!
//! Everything here is written against the [`HidDevice`] and
//! [`HardwareEffector`] traits handed in at construction, never against a
//! concrete device file or GPIO line. That is what lets the same session,
//! interpreter, and driver code run in live mode and in test mode.
//!
//! Control flow, outermost first:
//!
//! ```text
//! SessionLoop ─▶ ActionInterpreter ─▶ KeyboardDriver ─▶ HidTransport ─▶ device
//!                       └──────────▶ HardwareEffector
//! ```
//!
//! [`HidDevice`]: crate::infrastructure::hid::HidDevice
//! [`HardwareEffector`]: crate::infrastructure::effector::HardwareEffector

pub mod demo;
pub mod interpret;
pub mod keyboard;
pub mod session;
