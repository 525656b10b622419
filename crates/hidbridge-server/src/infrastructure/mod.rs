//! Infrastructure layer for the HID-Bridge server.
//!
//! Contains the OS-facing adapters: the HID gadget device and its transport,
//! the LED/buzzer effector, the peer accept loop, and TOML configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `hidbridge_core`. The application layer only sees the traits defined here
//! (`HidDevice`, `HardwareEffector`); concrete adapters are picked in
//! `main.rs`.

pub mod effector;
pub mod hid;
pub mod network;
pub mod storage;
