//! Simulated effector for test mode and boards without the LED/buzzer hat.
//!
//! Every command is logged and recorded, and its duration is honoured with a
//! real (tokio) sleep, so a script takes the same wall-clock time with or
//! without the hardware. That matters for `WAIT` steps, which pace the typing
//! the peer is recording.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{EffectorAction, EffectorCommand, HardwareEffector};

/// Commands kept by [`SimulatedEffector::new`].
pub const HISTORY_LEN: usize = 256;

/// An effector that only logs and sleeps.
#[derive(Debug)]
pub struct SimulatedEffector {
    /// The most recent commands received, including ones that were skipped.
    history: Mutex<VecDeque<EffectorCommand>>,
    history_len: usize,
}

impl Default for SimulatedEffector {
    fn default() -> Self {
        Self::with_history(HISTORY_LEN)
    }
}

impl SimulatedEffector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An effector that remembers at most `len` commands (at least one).
    pub fn with_history(len: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            history_len: len.max(1),
        }
    }

    /// Snapshot of the remembered commands, oldest first.
    pub fn recorded(&self) -> Vec<EffectorCommand> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HardwareEffector for SimulatedEffector {
    async fn run(&self, command: &EffectorCommand) {
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == self.history_len {
                history.pop_front();
            }
            history.push_back(command.clone());
        }

        match command.resolve() {
            Ok(EffectorAction::Led { color, on_for }) => {
                info!("[simulated] LED {color} for {on_for:?}");
                sleep(on_for).await;
            }
            Ok(EffectorAction::Leds { colors, on_for }) => {
                info!("[simulated] LEDs {colors} for {on_for:?}");
                sleep(on_for).await;
            }
            Ok(EffectorAction::Beep { repeat, on_for }) => {
                info!("[simulated] beep x{repeat} ({on_for:?} each)");
                // Pulses plus the gaps between them, as on the real buzzer.
                let pulses = repeat.saturating_mul(2).saturating_sub(1);
                sleep(on_for.saturating_mul(pulses)).await;
            }
            Ok(EffectorAction::Wait(duration)) => {
                info!("[simulated] wait {duration:?}");
                sleep(duration).await;
            }
            Err(e) => warn!("{} skipped: {e}", command.tag()),
        }
    }
}
