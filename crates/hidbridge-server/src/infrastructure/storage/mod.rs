//! Persistent storage for the server: the TOML configuration file.

pub mod config;
