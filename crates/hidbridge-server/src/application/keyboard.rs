//! KeyboardDriver: typing, deleting, and named key presses.
//!
//! Builds the operations scripts and literal text need on top of
//! [`HidTransport::send_stroke`] and [`KeyMap`]. Failures are per keystroke:
//! a character that cannot be typed is counted and logged, and the rest of
//! the string is still attempted. Only [`KeyboardDriver::delete_row`] stops
//! early, since forward-deleting past a failed keystroke could eat text that
//! was never meant to be touched.

use std::time::Duration;

use hidbridge_core::{HidKeyCode, KeyMap, KeyStroke};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::infrastructure::hid::{HidError, HidTransport};

/// The only row-deletion method; any other value is treated as this one.
pub const ROW_METHOD_BIOS: &str = "BIOS";

/// Error type for single keyboard operations.
#[derive(Debug, Error)]
pub enum KeyboardError {
    #[error("no key given")]
    EmptyKey,

    #[error("control character {0:?} cannot be typed")]
    ControlCharacter(char),

    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error(transparent)]
    Hid(#[from] HidError),
}

/// Pacing between keyboard-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardTiming {
    /// Pause after each backspace of a text deletion.
    pub backspace_spacing: Duration,
    /// Pause after each forward-delete of a row deletion.
    pub row_delete_spacing: Duration,
    /// Pause after HOME before the row deletion starts.
    pub home_settle: Duration,
}

impl Default for KeyboardTiming {
    fn default() -> Self {
        Self {
            backspace_spacing: Duration::from_millis(30),
            row_delete_spacing: Duration::from_millis(20),
            home_settle: Duration::from_millis(50),
        }
    }
}

/// Tally of a multi-keystroke operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeystrokeOutcome {
    pub sent: usize,
    pub failed: usize,
}

impl KeystrokeOutcome {
    /// `true` when no keystroke failed.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, result: Result<(), KeyboardError>, what: &str) {
        match result {
            Ok(()) => self.sent += 1,
            Err(e) => {
                warn!("{what} failed: {e}");
                self.failed += 1;
            }
        }
    }
}

/// Number of forward-deletes used to clear a row, from the script's time hint.
///
/// The target field's maximum length is unknown, so the count over-deletes in
/// three coarse tiers.
pub fn row_delete_count(time_hint: f64) -> usize {
    if time_hint <= 30.0 {
        30
    } else if time_hint <= 50.0 {
        50
    } else {
        80
    }
}

/// Keyboard operations over an owned [`HidTransport`].
pub struct KeyboardDriver {
    transport: HidTransport,
    timing: KeyboardTiming,
}

impl KeyboardDriver {
    pub fn new(transport: HidTransport, timing: KeyboardTiming) -> Self {
        Self { transport, timing }
    }

    pub fn transport(&self) -> &HidTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut HidTransport {
        &mut self.transport
    }

    /// Types one character.
    ///
    /// # Errors
    ///
    /// - [`KeyboardError::ControlCharacter`] for control characters other
    ///   than `'\n'` and `'\t'`.
    /// - [`KeyboardError::UnknownKey`] for characters outside the US layout.
    /// - [`KeyboardError::Hid`] if the report could not be written.
    pub async fn type_char(&mut self, c: char) -> Result<(), KeyboardError> {
        if c.is_control() && c != '\n' && c != '\t' {
            return Err(KeyboardError::ControlCharacter(c));
        }
        let stroke =
            KeyMap::lookup_char(c).ok_or_else(|| KeyboardError::UnknownKey(c.to_string()))?;
        self.send(stroke).await
    }

    /// Types every character of `text`, in order, attempting all of them.
    pub async fn type_string(&mut self, text: &str) -> KeystrokeOutcome {
        let mut outcome = KeystrokeOutcome::default();
        for c in text.chars() {
            let result = self.type_char(c).await;
            outcome.record(result, "typing character");
        }
        debug!(
            "typed {} of {} characters",
            outcome.sent,
            outcome.sent + outcome.failed
        );
        outcome
    }

    /// Presses a key by name (`"UP"`, `"home"`) or single character.
    ///
    /// # Errors
    ///
    /// [`KeyboardError::EmptyKey`], [`KeyboardError::UnknownKey`], or
    /// [`KeyboardError::Hid`].
    pub async fn press_key(&mut self, name: &str) -> Result<(), KeyboardError> {
        if name.is_empty() {
            return Err(KeyboardError::EmptyKey);
        }
        let stroke =
            KeyMap::lookup(name).ok_or_else(|| KeyboardError::UnknownKey(name.to_string()))?;
        debug!("pressing {name}");
        self.send(stroke).await
    }

    /// Sends one backspace per character of `text`.
    ///
    /// Only the length matters; the text itself is not re-read.
    pub async fn delete_string(&mut self, text: &str) -> KeystrokeOutcome {
        self.delete_chars(text.chars().count()).await
    }

    /// Sends `count` backspaces, each followed by `backspace_spacing`.
    pub async fn delete_chars(&mut self, count: usize) -> KeystrokeOutcome {
        info!("deleting {count} characters");
        let mut outcome = KeystrokeOutcome::default();
        for _ in 0..count {
            let result = self.send(KeyStroke::plain(HidKeyCode::Backspace)).await;
            outcome.record(result, "backspace");
            sleep(self.timing.backspace_spacing).await;
        }
        outcome
    }

    /// Clears the current input row: HOME, then a burst of forward-deletes.
    ///
    /// Returns the number of deletes sent.
    ///
    /// # Errors
    ///
    /// Returns the first delete that fails; the remaining deletes are not sent.
    pub async fn delete_row(&mut self, method: &str, time_hint: f64) -> Result<usize, KeyboardError> {
        if method != ROW_METHOD_BIOS {
            warn!("unknown row deletion method {method:?}; using {ROW_METHOD_BIOS}");
        }
        let count = row_delete_count(time_hint);
        info!("deleting row (method={ROW_METHOD_BIOS}, count={count})");

        if let Err(e) = self.send(KeyStroke::plain(HidKeyCode::Home)).await {
            warn!("HOME before row deletion failed: {e}");
        }
        sleep(self.timing.home_settle).await;

        for _ in 0..count {
            self.send(KeyStroke::plain(HidKeyCode::Delete)).await?;
            sleep(self.timing.row_delete_spacing).await;
        }
        Ok(count)
    }

    async fn send(&mut self, stroke: KeyStroke) -> Result<(), KeyboardError> {
        self.transport.send_stroke(stroke).await?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hid::recording::{InjectedFault, RecordingDevice, ReportLog};
    use crate::infrastructure::hid::TransportTiming;
    use hidbridge_core::{HidReport, Modifiers};

    fn driver() -> (KeyboardDriver, ReportLog) {
        let device = RecordingDevice::new();
        let log = device.log();
        let transport = HidTransport::new(Box::new(device), TransportTiming::default());
        (KeyboardDriver::new(transport, KeyboardTiming::default()), log)
    }

    #[test]
    fn test_row_delete_count_tiers() {
        let cases = [
            (29.0, 30),
            (30.0, 30),
            (31.0, 50),
            (50.0, 50),
            (51.0, 80),
            (200.0, 80),
            (0.0, 30),
        ];
        for (hint, expected) in cases {
            assert_eq!(row_delete_count(hint), expected, "time hint {hint}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_string_presses_each_character() {
        // Arrange
        let (mut keyboard, log) = driver();

        // Act
        let outcome = keyboard.type_string("Hi!").await;

        // Assert
        assert_eq!(outcome, KeystrokeOutcome { sent: 3, failed: 0 });
        assert_eq!(log.typed_text(), "Hi!");
        assert_eq!(
            log.presses()[0],
            HidReport::press(HidKeyCode::KeyH, Modifiers::SHIFT)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_string_attempts_all_characters_after_failure() {
        let (mut keyboard, log) = driver();

        let outcome = keyboard.type_string("a\u{7}é b").await;

        assert_eq!(outcome, KeystrokeOutcome { sent: 3, failed: 2 });
        assert!(!outcome.is_complete());
        assert_eq!(log.typed_text(), "a b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_char_rejects_control_characters_but_not_newline_or_tab() {
        let (mut keyboard, log) = driver();

        assert!(matches!(
            keyboard.type_char('\r').await,
            Err(KeyboardError::ControlCharacter('\r'))
        ));
        keyboard.type_char('\n').await.unwrap();
        keyboard.type_char('\t').await.unwrap();

        assert_eq!(log.typed_text(), "\n\t");
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_then_delete_issues_two_keystrokes_per_character() {
        // Arrange
        let (mut keyboard, log) = driver();
        let text = "audit42";

        // Act
        keyboard.type_string(text).await;
        let deleted = keyboard.delete_string(text).await;

        // Assert
        assert_eq!(deleted.sent, text.len());
        assert_eq!(log.presses().len(), 2 * text.len());
        assert_eq!(log.reports().len(), 4 * text.len(), "each press has a release");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_string_is_length_driven_and_spaced() {
        let (mut keyboard, log) = driver();
        let start = tokio::time::Instant::now();

        let outcome = keyboard.delete_string("héllo").await;

        assert_eq!(outcome.sent, 5);
        assert_eq!(log.typed_text(), "<Backspace>".repeat(5));
        // 5 x (30 ms press hold + 30 ms release hold + 30 ms spacing)
        assert_eq!(start.elapsed(), Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_key_resolves_names_case_insensitively() {
        let (mut keyboard, log) = driver();

        keyboard.press_key("up").await.unwrap();
        keyboard.press_key("Enter").await.unwrap();

        assert_eq!(log.typed_text(), "<ArrowUp>\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_key_rejects_empty_and_unknown_names() {
        let (mut keyboard, log) = driver();

        assert!(matches!(keyboard.press_key("").await, Err(KeyboardError::EmptyKey)));
        assert!(matches!(
            keyboard.press_key("HYPER").await,
            Err(KeyboardError::UnknownKey(k)) if k == "HYPER"
        ));
        assert!(log.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_row_presses_home_then_tiered_deletes() {
        // Arrange
        let (mut keyboard, log) = driver();

        // Act
        let count = keyboard.delete_row("BIOS", 45.0).await.unwrap();

        // Assert
        assert_eq!(count, 50);
        let presses = log.presses();
        assert_eq!(presses.len(), 51);
        assert_eq!(presses[0].key(), Some(HidKeyCode::Home));
        assert!(presses[1..]
            .iter()
            .all(|r| r.key() == Some(HidKeyCode::Delete)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_row_aborts_on_first_failed_delete() {
        let (mut keyboard, log) = driver();
        // HOME press and release succeed, then the first DELETE press fails.
        log.pass_writes(2);
        log.inject_write_fault(InjectedFault::Os(5));

        let result = keyboard.delete_row("BIOS", 10.0).await;

        assert!(matches!(result, Err(KeyboardError::Hid(_))));
        let presses = log.presses();
        assert_eq!(presses.len(), 1);
        assert_eq!(presses[0].key(), Some(HidKeyCode::Home));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_row_with_unknown_method_still_deletes() {
        let (mut keyboard, log) = driver();

        let count = keyboard.delete_row("ERASE", 30.0).await.unwrap();

        assert_eq!(count, 30);
        assert_eq!(log.presses().len(), 31);
    }
}
