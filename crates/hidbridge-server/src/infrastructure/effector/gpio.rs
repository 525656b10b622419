//! Sysfs GPIO effector for the LED/buzzer board.
//!
//! Each output is a sysfs GPIO line under `gpio_root` (normally
//! `/sys/class/gpio`):
//!
//! ```text
//! echo 23  > /sys/class/gpio/export
//! echo out > /sys/class/gpio/gpio23/direction
//! echo 1   > /sys/class/gpio/gpio23/value
//! ```
//!
//! Default wiring on a Raspberry Pi Zero 2 W header: red GPIO23 (pin 16),
//! blue GPIO24 (pin 18), yellow GPIO25 (pin 22), white GPIO26 (pin 37),
//! buzzer GPIO27 (pin 13), common ground on pin 6.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{EffectorAction, EffectorCommand, EffectorError, HardwareEffector, LedColor};

/// Default sysfs GPIO root.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// BCM line numbers of each output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioPins {
    #[serde(default = "default_red")]
    pub red: u32,
    #[serde(default = "default_yellow")]
    pub yellow: u32,
    #[serde(default = "default_blue")]
    pub blue: u32,
    #[serde(default = "default_white")]
    pub white: u32,
    #[serde(default = "default_buzzer")]
    pub buzzer: u32,
}

fn default_red() -> u32 {
    23
}
fn default_yellow() -> u32 {
    25
}
fn default_blue() -> u32 {
    24
}
fn default_white() -> u32 {
    26
}
fn default_buzzer() -> u32 {
    27
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            red: default_red(),
            yellow: default_yellow(),
            blue: default_blue(),
            white: default_white(),
            buzzer: default_buzzer(),
        }
    }
}

impl GpioPins {
    pub fn led(&self, color: LedColor) -> u32 {
        match color {
            LedColor::Red => self.red,
            LedColor::Yellow => self.yellow,
            LedColor::Blue => self.blue,
            LedColor::White => self.white,
        }
    }

    fn all(&self) -> [u32; 5] {
        [self.red, self.yellow, self.blue, self.white, self.buzzer]
    }
}

/// LEDs and buzzer driven through sysfs.
#[derive(Debug, Clone)]
pub struct GpioEffector {
    root: PathBuf,
    pins: GpioPins,
}

impl GpioEffector {
    pub fn new(root: impl Into<PathBuf>, pins: GpioPins) -> Self {
        Self {
            root: root.into(),
            pins,
        }
    }

    /// Exports every line and sets it to output, driven low.
    ///
    /// Lines that are already exported are left exported.
    ///
    /// # Errors
    ///
    /// Returns [`EffectorError::Io`] if a sysfs file cannot be written.
    pub fn export_all(&self) -> Result<(), EffectorError> {
        for pin in self.pins.all() {
            let line_dir = self.line_dir(pin);
            if !line_dir.exists() {
                write_sysfs(&self.root.join("export"), &pin.to_string())?;
                debug!("exported GPIO{pin}");
            }
            write_sysfs(&line_dir.join("direction"), "out")?;
            self.set(pin, false)?;
        }
        info!("GPIO effector ready under {}", self.root.display());
        Ok(())
    }

    fn line_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn set(&self, pin: u32, on: bool) -> Result<(), EffectorError> {
        write_sysfs(&self.line_dir(pin).join("value"), if on { "1" } else { "0" })
    }

    /// Drives `pin` high for `on_for`, then low. The line is driven low even
    /// if raising it failed half-way.
    async fn pulse(&self, pin: u32, on_for: std::time::Duration) -> Result<(), EffectorError> {
        let raised = self.set(pin, true);
        if raised.is_ok() {
            sleep(on_for).await;
        }
        let lowered = self.set(pin, false);
        raised.and(lowered)
    }

    async fn perform(&self, action: EffectorAction) -> Result<(), EffectorError> {
        match action {
            EffectorAction::Led { color, on_for } => {
                debug!("LED {color} on for {on_for:?}");
                self.pulse(self.pins.led(color), on_for).await
            }
            EffectorAction::Leds { colors, on_for } => {
                debug!("LEDs {colors} on for {on_for:?}");
                let pins: Vec<u32> = colors.colors().map(|c| self.pins.led(c)).collect();
                let mut raised: Result<(), EffectorError> = Ok(());
                for &pin in &pins {
                    raised = raised.and(self.set(pin, true));
                }
                if raised.is_ok() {
                    sleep(on_for).await;
                }
                let mut lowered: Result<(), EffectorError> = Ok(());
                for &pin in &pins {
                    lowered = lowered.and(self.set(pin, false));
                }
                raised.and(lowered)
            }
            EffectorAction::Beep { repeat, on_for } => {
                debug!("buzzer x{repeat}, {on_for:?} each");
                for i in 0..repeat {
                    if i > 0 {
                        sleep(on_for).await;
                    }
                    self.pulse(self.pins.buzzer, on_for).await?;
                }
                Ok(())
            }
            EffectorAction::Wait(duration) => {
                sleep(duration).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl HardwareEffector for GpioEffector {
    async fn run(&self, command: &EffectorCommand) {
        let result = match command.resolve() {
            Ok(action) => self.perform(action).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("{} skipped: {e}", command.tag());
        }
    }
}

fn write_sysfs(path: &Path, value: &str) -> Result<(), EffectorError> {
    std::fs::write(path, value).map_err(|source| EffectorError::Io {
        path: path.to_path_buf(),
        source,
    })
}
