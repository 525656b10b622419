//! TOML-based configuration for the bridge.
//!
//! Read from `$XDG_CONFIG_HOME/hidbridge/config.toml`, falling back to
//! `~/.config/hidbridge/config.toml`. A missing file is not an error: the
//! bridge runs on defaults, which match a stock Raspberry Pi gadget setup.
//!
//! ```toml
//! [device]
//! path = "/dev/hidg0"
//! max_retries = 5
//!
//! [timing]
//! report_hold_ms = 30
//!
//! [effector]
//! backend = "gpio"
//!
//! [effector.pins]
//! red = 23
//! ```
//!
//! Every field has a serde default, so a file only needs the values it
//! changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::keyboard::KeyboardTiming;
use crate::infrastructure::effector::gpio::{GpioPins, DEFAULT_GPIO_ROOT};
use crate::infrastructure::hid::gadget::DEFAULT_DEVICE_PATH;
use crate::infrastructure::hid::TransportTiming;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub effector: EffectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// HID gadget device settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_device_path")]
    pub path: PathBuf,
    /// Record reports instead of writing them.
    #[serde(default)]
    pub test_mode: bool,
    /// Switch to test mode when `path` does not exist instead of failing.
    #[serde(default = "default_true")]
    pub fallback_to_test_mode: bool,
    /// Total write attempts per report. Zero is treated as one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Keystroke timing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_report_hold_ms")]
    pub report_hold_ms: u64,
    #[serde(default = "default_busy_backoff_ms")]
    pub busy_backoff_ms: u64,
    #[serde(default = "default_reset_backoff_ms")]
    pub reset_backoff_ms: u64,
    #[serde(default = "default_backspace_spacing_ms")]
    pub backspace_spacing_ms: u64,
    #[serde(default = "default_row_delete_spacing_ms")]
    pub row_delete_spacing_ms: u64,
    #[serde(default = "default_home_settle_ms")]
    pub home_settle_ms: u64,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which effector drives the LEDs and buzzer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EffectorBackend {
    #[default]
    Simulated,
    Gpio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectorConfig {
    #[serde(default)]
    pub backend: EffectorBackend,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
    #[serde(default)]
    pub pins: GpioPins,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_device_path() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE_PATH)
}
fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    5
}
fn default_report_hold_ms() -> u64 {
    30
}
fn default_busy_backoff_ms() -> u64 {
    50
}
fn default_reset_backoff_ms() -> u64 {
    100
}
fn default_backspace_spacing_ms() -> u64 {
    30
}
fn default_row_delete_spacing_ms() -> u64 {
    20
}
fn default_home_settle_ms() -> u64 {
    50
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    24810
}
fn default_gpio_root() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_ROOT)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            test_mode: false,
            fallback_to_test_mode: default_true(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            report_hold_ms: default_report_hold_ms(),
            busy_backoff_ms: default_busy_backoff_ms(),
            reset_backoff_ms: default_reset_backoff_ms(),
            backspace_spacing_ms: default_backspace_spacing_ms(),
            row_delete_spacing_ms: default_row_delete_spacing_ms(),
            home_settle_ms: default_home_settle_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for EffectorConfig {
    fn default() -> Self {
        Self {
            backend: EffectorBackend::default(),
            gpio_root: default_gpio_root(),
            pins: GpioPins::default(),
        }
    }
}

impl AppConfig {
    /// Transport timing and retry budget. The budget is at least one attempt.
    pub fn transport_timing(&self) -> TransportTiming {
        TransportTiming {
            report_hold: Duration::from_millis(self.timing.report_hold_ms),
            busy_backoff: Duration::from_millis(self.timing.busy_backoff_ms),
            reset_backoff: Duration::from_millis(self.timing.reset_backoff_ms),
            max_retries: self.device.max_retries.max(1),
        }
    }

    /// Keyboard-level pacing.
    pub fn keyboard_timing(&self) -> KeyboardTiming {
        KeyboardTiming {
            backspace_spacing: Duration::from_millis(self.timing.backspace_spacing_ms),
            row_delete_spacing: Duration::from_millis(self.timing.row_delete_spacing_ms),
            home_settle: Duration::from_millis(self.timing.home_settle_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Directory holding `config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Full path of the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("hidbridge"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
