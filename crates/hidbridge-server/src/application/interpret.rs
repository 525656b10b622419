//! ActionInterpreter: classifies a payload and runs it as an action script.
//!
//! A payload that parses as a script (see [`parse_script`]) is executed step
//! by step, strictly in order: step *n + 1* starts only after step *n*,
//! including any `WAIT`, has finished. Anything else is reported back as
//! [`InterpretResult::NotStructured`] so the session can type it as literal
//! text. That result is a classification, not an error.
//!
//! # Dispatch
//!
//! | Step          | Keyboard                          | Effector afterwards   |
//! |---------------|-----------------------------------|-----------------------|
//! | `HID`         | [`KeyboardDriver::press_key`]     | Yellow blink, 0.1 s   |
//! | `TYPE`        | [`KeyboardDriver::type_string`]   | Blue blink, 0.1 s     |
//! | `DELETE_TEXT` | [`KeyboardDriver::delete_string`] | Red blink, 0.1 s      |
//! | `DELETE_ROW`  | [`KeyboardDriver::delete_row`]    | Red blink, 0.2 s      |
//! | `LED` / `LED_MULTI` / `BEEP` / `WAIT` | none        | forwarded as given    |
//!
//! Keyboard failures are logged and tallied in the [`ScriptReport`]; they do
//! not stop the script. Unknown tags are skipped with a warning.

use std::sync::Arc;

use hidbridge_core::{parse_script, ActionStep};
use tracing::{debug, info, warn};

use crate::application::keyboard::KeyboardDriver;
use crate::infrastructure::effector::{EffectorCommand, HardwareEffector, LedColor};

/// How long the confirmation blink after a keyboard step lasts.
const BLINK_SECONDS: f64 = 0.1;
/// Row deletion gets a longer blink so it is distinguishable from a backspace.
const ROW_BLINK_SECONDS: f64 = 0.2;

/// How a payload was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    /// The payload is not a command list; treat it as literal text.
    NotStructured,
    /// The payload was a command list and all of its records were attempted.
    Executed(usize),
}

/// Tally of one script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    /// Records attempted.
    pub steps: usize,
    /// Keyboard steps with at least one failed keystroke.
    pub failed_steps: usize,
    /// Records with an unknown tag.
    pub skipped_steps: usize,
}

/// Runs scripts against a keyboard and a hardware effector.
pub struct ActionInterpreter {
    keyboard: KeyboardDriver,
    effector: Arc<dyn HardwareEffector>,
    scripts_executed: u64,
}

impl ActionInterpreter {
    pub fn new(keyboard: KeyboardDriver, effector: Arc<dyn HardwareEffector>) -> Self {
        Self {
            keyboard,
            effector,
            scripts_executed: 0,
        }
    }

    pub fn keyboard(&self) -> &KeyboardDriver {
        &self.keyboard
    }

    /// The keyboard, for typing literal text outside a script.
    pub fn keyboard_mut(&mut self) -> &mut KeyboardDriver {
        &mut self.keyboard
    }

    /// Scripts executed since this interpreter was created.
    pub fn scripts_executed(&self) -> u64 {
        self.scripts_executed
    }

    /// Classifies `payload` and, if it is a script, executes it.
    pub async fn interpret(&mut self, payload: &str) -> InterpretResult {
        let steps = match parse_script(payload) {
            Ok(steps) => steps,
            Err(e) => {
                debug!("payload is not a script: {e}");
                return InterpretResult::NotStructured;
            }
        };

        info!("script received: {} steps", steps.len());
        let report = self.execute(&steps).await;
        InterpretResult::Executed(report.steps)
    }

    /// Executes already-parsed steps in order.
    pub async fn execute(&mut self, steps: &[ActionStep]) -> ScriptReport {
        let mut report = ScriptReport::default();
        for (i, step) in steps.iter().enumerate() {
            debug!("step {}/{}: {}", i + 1, steps.len(), step.tag());
            report.steps += 1;
            match self.run_step(step).await {
                StepOutcome::Done => {}
                StepOutcome::Failed => report.failed_steps += 1,
                StepOutcome::Skipped => report.skipped_steps += 1,
            }
        }

        self.scripts_executed += 1;
        if report.failed_steps > 0 || report.skipped_steps > 0 {
            warn!(
                "script finished: {} steps, {} failed, {} skipped",
                report.steps, report.failed_steps, report.skipped_steps
            );
        } else {
            info!("script finished: {} steps", report.steps);
        }
        report
    }

    async fn run_step(&mut self, step: &ActionStep) -> StepOutcome {
        match step {
            ActionStep::PressKey(key) => {
                let outcome = if key.is_empty() {
                    debug!("HID step without a key; nothing pressed");
                    StepOutcome::Done
                } else {
                    match self.keyboard.press_key(key).await {
                        Ok(()) => StepOutcome::Done,
                        Err(e) => {
                            warn!("HID {key:?} failed: {e}");
                            StepOutcome::Failed
                        }
                    }
                };
                self.blink(LedColor::Yellow, BLINK_SECONDS).await;
                outcome
            }
            ActionStep::TypeText(text) => {
                info!("typing {} characters", text.chars().count());
                let outcome = self.keyboard.type_string(text).await;
                self.blink(LedColor::Blue, BLINK_SECONDS).await;
                StepOutcome::from_complete(outcome.is_complete())
            }
            ActionStep::DeleteText(text) => {
                let outcome = self.keyboard.delete_string(text).await;
                self.blink(LedColor::Red, BLINK_SECONDS).await;
                StepOutcome::from_complete(outcome.is_complete())
            }
            ActionStep::Backspace(count) => {
                let outcome = self.keyboard.delete_chars(*count).await;
                self.blink(LedColor::Red, BLINK_SECONDS).await;
                StepOutcome::from_complete(outcome.is_complete())
            }
            ActionStep::DeleteRow { method, time_hint } => {
                let result = self.keyboard.delete_row(method, *time_hint).await;
                if let Err(e) = &result {
                    warn!("row deletion aborted: {e}");
                }
                self.blink(LedColor::Red, ROW_BLINK_SECONDS).await;
                StepOutcome::from_complete(result.is_ok())
            }
            ActionStep::SignalLed { color, duration } => {
                self.effector
                    .run(&EffectorCommand::Led {
                        color: color.clone(),
                        duration: *duration,
                    })
                    .await;
                StepOutcome::Done
            }
            ActionStep::SignalLeds { colors, duration } => {
                self.effector
                    .run(&EffectorCommand::LedMulti {
                        colors: colors.clone(),
                        duration: *duration,
                    })
                    .await;
                StepOutcome::Done
            }
            ActionStep::SignalBeep { repeat, pattern } => {
                self.effector
                    .run(&EffectorCommand::Beep {
                        repeat: *repeat,
                        pattern: pattern.clone(),
                    })
                    .await;
                StepOutcome::Done
            }
            ActionStep::Wait { seconds } => {
                self.effector
                    .run(&EffectorCommand::Wait { seconds: *seconds })
                    .await;
                StepOutcome::Done
            }
            ActionStep::Unknown(tag) => {
                warn!("unknown command {tag:?}; skipped");
                StepOutcome::Skipped
            }
        }
    }

    async fn blink(&self, color: LedColor, seconds: f64) {
        self.effector
            .run(&EffectorCommand::blink(color, seconds))
            .await;
    }
}

enum StepOutcome {
    Done,
    Failed,
    Skipped,
}

impl StepOutcome {
    fn from_complete(complete: bool) -> Self {
        if complete {
            StepOutcome::Done
        } else {
            StepOutcome::Failed
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::keyboard::KeyboardTiming;
    use crate::infrastructure::effector::simulated::SimulatedEffector;
    use crate::infrastructure::effector::MockHardwareEffector;
    use crate::infrastructure::hid::recording::{InjectedFault, RecordingDevice, ReportLog};
    use crate::infrastructure::hid::{HidTransport, TransportTiming};
    use hidbridge_core::HidKeyCode;

    fn interpreter(effector: Arc<dyn HardwareEffector>) -> (ActionInterpreter, ReportLog) {
        let device = RecordingDevice::new();
        let log = device.log();
        let transport = HidTransport::new(Box::new(device), TransportTiming::default());
        let keyboard = KeyboardDriver::new(transport, KeyboardTiming::default());
        (ActionInterpreter::new(keyboard, effector), log)
    }

    fn blink(color: LedColor, seconds: f64) -> EffectorCommand {
        EffectorCommand::blink(color, seconds)
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_scripts_are_not_structured() {
        // Arrange: nothing may reach the effector.
        let mut effector = MockHardwareEffector::new();
        effector.expect_run().times(0);
        let (mut interp, log) = interpreter(Arc::new(effector));

        // Act + Assert
        for payload in ["", "hello world", r#"[{"Command":"TYPE","Parameters":{"Text":"a"}"#] {
            assert_eq!(
                interp.interpret(payload).await,
                InterpretResult::NotStructured,
                "{payload:?}"
            );
        }
        assert!(log.reports().is_empty());
        assert_eq!(interp.scripts_executed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_record_script_is_executed_in_order() {
        // Arrange
        let mut effector = MockHardwareEffector::new();
        let mut seq = mockall::Sequence::new();
        effector
            .expect_run()
            .withf(|c| *c == blink(LedColor::Blue, 0.1))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        effector
            .expect_run()
            .withf(|c| *c == blink(LedColor::Yellow, 0.1))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        effector
            .expect_run()
            .withf(|c| *c == EffectorCommand::Wait { seconds: Some(0.5) })
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let (mut interp, log) = interpreter(Arc::new(effector));
        let payload = r#"[
            {"Command": "TYPE", "Parameters": {"Text": "ab"}},
            {"Command": "HID", "Parameters": {"Key": "ENTER"}},
            {"Command": "WAIT", "Parameters": {"Seconds": 0.5}}
        ]"#;

        // Act
        let result = interp.interpret(payload).await;

        // Assert
        assert_eq!(result, InterpretResult::Executed(3));
        assert_eq!(log.typed_text(), "ab\n");
        assert_eq!(interp.scripts_executed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_are_forwarded_verbatim() {
        let mut effector = MockHardwareEffector::new();
        effector
            .expect_run()
            .withf(|c| {
                *c == EffectorCommand::Led {
                    color: Some("Green".into()),
                    duration: None,
                }
            })
            .times(1)
            .return_const(());
        effector
            .expect_run()
            .withf(|c| {
                *c == EffectorCommand::Beep {
                    repeat: Some(2),
                    pattern: Some("Long".into()),
                }
            })
            .times(1)
            .return_const(());
        effector
            .expect_run()
            .withf(|c| {
                *c == EffectorCommand::LedMulti {
                    colors: vec!["Red".into(), "Blue".into()],
                    duration: Some(2.0),
                }
            })
            .times(1)
            .return_const(());
        let (mut interp, log) = interpreter(Arc::new(effector));

        let result = interp
            .interpret(
                r#"[{"Command":"LED","Parameters":{"Color":"Green"}},
                    {"Command":"BEEP","Parameters":{"Repeat":2,"Pattern":"Long"}},
                    {"Command":"LED_MULTI","Parameters":{"Colors":["Red","Blue"],"Duration":2}}]"#,
            )
            .await;

        assert_eq!(result, InterpretResult::Executed(3));
        assert!(log.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_tag_is_skipped_and_script_continues() {
        // Arrange
        let effector = Arc::new(SimulatedEffector::new());
        let (mut interp, log) = interpreter(effector.clone());
        let steps = vec![
            ActionStep::Unknown("MORSE".into()),
            ActionStep::PressKey("UP".into()),
        ];

        // Act
        let report = interp.execute(&steps).await;

        // Assert
        assert_eq!(
            report,
            ScriptReport {
                steps: 2,
                failed_steps: 0,
                skipped_steps: 1
            }
        );
        assert_eq!(log.presses()[0].key(), Some(HidKeyCode::ArrowUp));
        assert_eq!(effector.recorded(), vec![blink(LedColor::Yellow, 0.1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_key_still_blinks() {
        let effector = Arc::new(SimulatedEffector::new());
        let (mut interp, log) = interpreter(effector.clone());

        let result = interp
            .interpret(r#"[{"Command":"HID","Parameters":{}}]"#)
            .await;

        assert_eq!(result, InterpretResult::Executed(1));
        assert!(log.reports().is_empty());
        assert_eq!(effector.recorded(), vec![blink(LedColor::Yellow, 0.1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyboard_failure_is_tallied_not_fatal() {
        // Arrange: the TYPE step's only press fails outright.
        let effector = Arc::new(SimulatedEffector::new());
        let (mut interp, log) = interpreter(effector.clone());
        log.inject_write_fault(InjectedFault::Os(5));
        let steps = vec![
            ActionStep::TypeText("x".into()),
            ActionStep::DeleteText("yz".into()),
        ];

        // Act
        let report = interp.execute(&steps).await;

        // Assert
        assert_eq!(report.failed_steps, 1);
        assert_eq!(log.typed_text(), "<Backspace><Backspace>");
        assert_eq!(
            effector.recorded(),
            vec![blink(LedColor::Blue, 0.1), blink(LedColor::Red, 0.1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_delete_sends_counted_backspaces() {
        let effector = Arc::new(SimulatedEffector::new());
        let (mut interp, log) = interpreter(effector.clone());

        let result = interp
            .interpret(r#"[{"cmd":"HID","params":{"action":"DELETE","count":3}}]"#)
            .await;

        assert_eq!(result, InterpretResult::Executed(1));
        assert_eq!(log.presses().len(), 3);
        assert_eq!(effector.recorded(), vec![blink(LedColor::Red, 0.1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_row_uses_longer_blink() {
        let effector = Arc::new(SimulatedEffector::new());
        let (mut interp, log) = interpreter(effector.clone());

        interp
            .interpret(r#"[{"Command":"DELETE_ROW","Parameters":{"Method":"BIOS","Time":45}}]"#)
            .await;

        // HOME plus 50 deletes
        assert_eq!(log.presses().len(), 51);
        assert_eq!(effector.recorded(), vec![blink(LedColor::Red, 0.2)]);
    }
}
