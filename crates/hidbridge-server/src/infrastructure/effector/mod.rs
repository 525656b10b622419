//! Hardware effector: status LEDs, the buzzer, and timed waits.
//!
//! The interpreter forwards `LED`, `LED_MULTI`, `BEEP`, and `WAIT` steps here and sends a
//! short LED blink after every keyboard step. The effector is fire-and-forget
//! from the caller's side: [`HardwareEffector::run`] returns nothing, and
//! every failure (unknown colour, bad duration, GPIO I/O error) is logged and
//! swallowed by the implementation.
//!
//! # Parameter resolution
//!
//! [`EffectorCommand`] carries the values exactly as the script gave them,
//! with `None` for anything missing. [`EffectorCommand::resolve`] applies the
//! defaults and validation shared by every implementation:
//!
//! | Command | Default                         |
//! |---------|---------------------------------|
//! | LED     | colour `White`, 2.0 s           |
//! | LED_MULTI | 2.0 s; at least one colour is required |
//! | BEEP    | 1 repeat; `Short` 0.1 s, `Long` 0.5 s, anything else 2.0 s |
//! | WAIT    | 2.0 s                           |

pub mod gpio;
pub mod simulated;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Default LED on-time in seconds.
pub const DEFAULT_LED_SECONDS: f64 = 2.0;
/// Default buzzer repeat count.
pub const DEFAULT_BEEP_REPEAT: u32 = 1;
/// Buzzer on-time for an unrecognised or missing pattern.
pub const DEFAULT_BEEP_SECONDS: f64 = 2.0;
/// Default wait in seconds.
pub const DEFAULT_WAIT_SECONDS: f64 = 2.0;

/// Error type for effector commands.
#[derive(Debug, Error)]
pub enum EffectorError {
    #[error("unknown LED colour {0:?}")]
    UnknownColor(String),

    #[error("invalid duration {0} s")]
    InvalidDuration(f64),

    #[error("no LED colours given")]
    NoColors,

    #[error("GPIO I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The four status LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedColor {
    Red,
    Yellow,
    Blue,
    White,
}

impl LedColor {
    /// Parses a colour name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "red" => Some(LedColor::Red),
            "yellow" => Some(LedColor::Yellow),
            "blue" => Some(LedColor::Blue),
            "white" => Some(LedColor::White),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LedColor::Red => "Red",
            LedColor::Yellow => "Yellow",
            LedColor::Blue => "Blue",
            LedColor::White => "White",
        }
    }
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of LEDs lit together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LedSet(u8);

impl LedSet {
    const ALL: [LedColor; 4] = [LedColor::Red, LedColor::Yellow, LedColor::Blue, LedColor::White];

    fn bit(color: LedColor) -> u8 {
        match color {
            LedColor::Red => 0x01,
            LedColor::Yellow => 0x02,
            LedColor::Blue => 0x04,
            LedColor::White => 0x08,
        }
    }

    pub fn insert(&mut self, color: LedColor) {
        self.0 |= Self::bit(color);
    }

    pub fn contains(self, color: LedColor) -> bool {
        self.0 & Self::bit(color) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in a fixed order: red, yellow, blue, white.
    pub fn colors(self) -> impl Iterator<Item = LedColor> {
        Self::ALL.into_iter().filter(move |&c| self.contains(c))
    }
}

impl FromIterator<LedColor> for LedSet {
    fn from_iter<I: IntoIterator<Item = LedColor>>(iter: I) -> Self {
        let mut set = LedSet::default();
        for color in iter {
            set.insert(color);
        }
        set
    }
}

impl fmt::Display for LedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.colors().map(LedColor::name).collect();
        f.write_str(&names.join("+"))
    }
}

/// A command for the effector, with optional (unresolved) parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectorCommand {
    Led {
        color: Option<String>,
        duration: Option<f64>,
    },
    LedMulti {
        colors: Vec<String>,
        duration: Option<f64>,
    },
    Beep {
        repeat: Option<u32>,
        pattern: Option<String>,
    },
    Wait {
        seconds: Option<f64>,
    },
}

/// A validated effector action with every default applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectorAction {
    Led { color: LedColor, on_for: Duration },
    Leds { colors: LedSet, on_for: Duration },
    Beep { repeat: u32, on_for: Duration },
    Wait(Duration),
}

impl EffectorCommand {
    /// A confirmation blink of a known colour.
    pub fn blink(color: LedColor, seconds: f64) -> Self {
        EffectorCommand::Led {
            color: Some(color.name().to_string()),
            duration: Some(seconds),
        }
    }

    /// Command tag as it appears in scripts.
    pub fn tag(&self) -> &'static str {
        match self {
            EffectorCommand::Led { .. } => "LED",
            EffectorCommand::LedMulti { .. } => "LED_MULTI",
            EffectorCommand::Beep { .. } => "BEEP",
            EffectorCommand::Wait { .. } => "WAIT",
        }
    }

    /// Applies defaults and validates the parameters.
    ///
    /// # Errors
    ///
    /// - [`EffectorError::UnknownColor`] for an LED colour outside
    ///   `Red|Yellow|Blue|White`.
    /// - [`EffectorError::NoColors`] for an `LED_MULTI` without colours.
    /// - [`EffectorError::InvalidDuration`] for a negative or non-finite time.
    pub fn resolve(&self) -> Result<EffectorAction, EffectorError> {
        match self {
            EffectorCommand::Led { color, duration } => {
                let color = match color {
                    None => LedColor::White,
                    Some(name) => LedColor::parse(name)
                        .ok_or_else(|| EffectorError::UnknownColor(name.clone()))?,
                };
                Ok(EffectorAction::Led {
                    color,
                    on_for: seconds(duration.unwrap_or(DEFAULT_LED_SECONDS))?,
                })
            }
            EffectorCommand::LedMulti { colors, duration } => {
                let colors = colors
                    .iter()
                    .map(|name| {
                        LedColor::parse(name).ok_or_else(|| EffectorError::UnknownColor(name.clone()))
                    })
                    .collect::<Result<LedSet, _>>()?;
                if colors.is_empty() {
                    return Err(EffectorError::NoColors);
                }
                Ok(EffectorAction::Leds {
                    colors,
                    on_for: seconds(duration.unwrap_or(DEFAULT_LED_SECONDS))?,
                })
            }
            EffectorCommand::Beep { repeat, pattern } => Ok(EffectorAction::Beep {
                repeat: repeat.unwrap_or(DEFAULT_BEEP_REPEAT),
                on_for: seconds(beep_seconds(pattern.as_deref()))?,
            }),
            EffectorCommand::Wait { seconds: secs } => Ok(EffectorAction::Wait(seconds(
                secs.unwrap_or(DEFAULT_WAIT_SECONDS),
            )?)),
        }
    }
}

fn beep_seconds(pattern: Option<&str>) -> f64 {
    match pattern.map(str::to_ascii_lowercase).as_deref() {
        Some("short") => 0.1,
        Some("long") => 0.5,
        _ => DEFAULT_BEEP_SECONDS,
    }
}

fn seconds(value: f64) -> Result<Duration, EffectorError> {
    Duration::try_from_secs_f64(value).map_err(|_| EffectorError::InvalidDuration(value))
}

/// Drives the status LEDs and buzzer.
///
/// `run` completes only after the action has finished (the LED is off again,
/// the last beep has ended, the wait has elapsed), so script steps never
/// overlap.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HardwareEffector: Send + Sync {
    async fn run(&self, command: &EffectorCommand);
}
