//! hidbridge-server library crate.
//!
//! Turns a Linux board with USB gadget support into a keyboard that a remote
//! peer drives over a serial link. The binary (`hidbridge`) wires the pieces
//! together; this library holds all of the logic so it can be tested without
//! the hardware.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Peer (JSON script or plain text)
//!         ↕
//! [hidbridge-server]
//!   ├── application/      SessionLoop, ActionInterpreter, KeyboardDriver, demo
//!   └── infrastructure/
//!         ├── hid/        HidTransport + gadget / recording devices
//!         ├── effector/   LEDs and buzzer (sysfs GPIO or simulated)
//!         ├── network/    accept loop
//!         └── storage/    TOML configuration
//!         ↓
//! /dev/hidg0  (8-byte boot keyboard reports to the USB host)
//! ```
//!
//! # For beginners: what is a HID gadget?
//!
//! Linux can make a board *act as* a USB device instead of hosting one. With
//! the HID gadget function configured, the kernel exposes `/dev/hidg0`; every
//! 8 bytes written to it arrive at the USB host as a keyboard report, exactly
//! as if a physical keyboard had sent them. Pressing a key is one report with
//! the key's code in it, releasing it is a report of all zeros.

/// Application layer: sessions, script interpretation, keyboard operations.
pub mod application;

/// Infrastructure layer: HID device, effector, network, and configuration.
pub mod infrastructure;
