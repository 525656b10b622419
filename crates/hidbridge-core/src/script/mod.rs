//! Action scripts: the typed model and the JSON parsers.
//!
//! A script is an ordered list of [`ActionStep`]s. Two JSON record shapes are
//! accepted in the same array, and both produce the same steps:
//!
//! ```text
//! {"Command": "TYPE", "Parameters": {"Text": "hi"}}          canonical
//! {"cmd": "HID", "params": {"action": "TYPE", "text": "hi"}}  generator
//! ```
//!
//! A third, compact text encoding lives in [`action_code`].
//!
//! # Classification, not failure
//!
//! [`parse_script`] returning `Err` means "this payload is not a script", and
//! the session types it as literal text instead. Every record is parsed
//! before anything runs, so a payload that is broken halfway through never
//! executes its first half.
//!
//! Parameter values are lenient: numbers may arrive as JSON numbers or as
//! numeric strings, and a value of the wrong type falls back to the default
//! with a warning rather than rejecting the whole script.

pub mod action_code;

pub use action_code::{parse_action_code, to_action_code};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Default `DELETE_ROW` method.
pub const DEFAULT_ROW_METHOD: &str = "BIOS";

/// Default `DELETE_ROW` time hint.
pub const DEFAULT_ROW_TIME_HINT: f64 = 30.0;

/// Reasons a payload is not a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("payload is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("payload is JSON but not an array")]
    NotAnArray,

    #[error("record {index} is not an object")]
    RecordNotObject { index: usize },

    #[error("parameters of record {index} are not an object")]
    ParametersNotObject { index: usize },

    #[error("action code error at byte {position}: {reason}")]
    ActionCode { position: usize, reason: String },
}

/// One step of an action script.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionStep {
    /// Press one named key or character (`HID {"Key"}`).
    PressKey(String),
    /// Type a string (`TYPE {"Text"}`).
    TypeText(String),
    /// One backspace per character of the text (`DELETE_TEXT {"Text"}`).
    DeleteText(String),
    /// A fixed number of backspaces (generator `DELETE {"count"}`).
    Backspace(usize),
    /// HOME then a tiered burst of forward-deletes (`DELETE_ROW`).
    DeleteRow { method: String, time_hint: f64 },
    /// Light an LED. Missing values are resolved by the effector.
    SignalLed {
        color: Option<String>,
        duration: Option<f64>,
    },
    /// Light several LEDs together (`LED_MULTI {"Colors"}`).
    SignalLeds {
        colors: Vec<String>,
        duration: Option<f64>,
    },
    /// Sound the buzzer. Missing values are resolved by the effector.
    SignalBeep {
        repeat: Option<u32>,
        pattern: Option<String>,
    },
    /// Pause the script.
    Wait { seconds: Option<f64> },
    /// A record whose tag is missing or not recognised; skipped when run.
    Unknown(String),
}

impl ActionStep {
    /// The canonical command tag this step corresponds to.
    pub fn tag(&self) -> &str {
        match self {
            ActionStep::PressKey(_) => "HID",
            ActionStep::TypeText(_) => "TYPE",
            ActionStep::DeleteText(_) | ActionStep::Backspace(_) => "DELETE_TEXT",
            ActionStep::DeleteRow { .. } => "DELETE_ROW",
            ActionStep::SignalLed { .. } => "LED",
            ActionStep::SignalLeds { .. } => "LED_MULTI",
            ActionStep::SignalBeep { .. } => "BEEP",
            ActionStep::Wait { .. } => "WAIT",
            ActionStep::Unknown(tag) => tag,
        }
    }
}

/// Parses a payload into a script.
///
/// Leading and trailing whitespace and a UTF-8 byte-order mark are ignored.
pub fn parse_script(payload: &str) -> Result<Vec<ActionStep>, ScriptError> {
    let trimmed = payload.trim().trim_start_matches('\u{feff}');
    let value: Value = serde_json::from_str(trimmed).map_err(ScriptError::NotJson)?;
    let Value::Array(records) = value else {
        return Err(ScriptError::NotAnArray);
    };

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let record = record
                .as_object()
                .ok_or(ScriptError::RecordNotObject { index })?;
            parse_record(index, record)
        })
        .collect()
}

fn parse_record(index: usize, record: &Map<String, Value>) -> Result<ActionStep, ScriptError> {
    if let Some(tag) = record.get("Command") {
        let params = params_of(index, record.get("Parameters"))?;
        Ok(canonical_step(&tag_text(tag), &params))
    } else if let Some(tag) = record.get("cmd") {
        let params = params_of(index, record.get("params"))?;
        Ok(generator_step(&tag_text(tag), &params))
    } else {
        Ok(ActionStep::Unknown(String::new()))
    }
}

fn params_of(index: usize, value: Option<&Value>) -> Result<Map<String, Value>, ScriptError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ScriptError::ParametersNotObject { index }),
    }
}

fn tag_text(tag: &Value) -> String {
    match tag {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn canonical_step(tag: &str, params: &Map<String, Value>) -> ActionStep {
    match tag {
        "HID" => ActionStep::PressKey(text_param(params, "Key").unwrap_or_default()),
        "TYPE" => ActionStep::TypeText(text_param(params, "Text").unwrap_or_default()),
        "DELETE_TEXT" => ActionStep::DeleteText(text_param(params, "Text").unwrap_or_default()),
        "DELETE_ROW" => ActionStep::DeleteRow {
            method: text_param(params, "Method").unwrap_or_else(|| DEFAULT_ROW_METHOD.to_owned()),
            time_hint: number_param(params, "Time").unwrap_or(DEFAULT_ROW_TIME_HINT),
        },
        "LED" => ActionStep::SignalLed {
            color: label_param(params, "Color"),
            duration: number_param(params, "Duration"),
        },
        "LED_MULTI" => ActionStep::SignalLeds {
            colors: label_list_param(params, "Colors"),
            duration: number_param(params, "Duration"),
        },
        "BEEP" => ActionStep::SignalBeep {
            repeat: count_param(params, "Repeat"),
            pattern: label_param(params, "Pattern"),
        },
        "WAIT" => ActionStep::Wait {
            seconds: number_param(params, "Seconds"),
        },
        other => ActionStep::Unknown(other.to_owned()),
    }
}

fn generator_step(tag: &str, params: &Map<String, Value>) -> ActionStep {
    match tag {
        "HID" => {
            let action = text_param(params, "action").unwrap_or_default();
            match action.as_str() {
                "TYPE" => ActionStep::TypeText(text_param(params, "text").unwrap_or_default()),
                "DELETE" => ActionStep::Backspace(
                    count_param(params, "count").map_or(0, |n| n as usize),
                ),
                "PRESS" => ActionStep::PressKey(text_param(params, "key").unwrap_or_default()),
                _ => ActionStep::Unknown(format!("HID:{action}")),
            }
        }
        "WAIT" => ActionStep::Wait {
            seconds: number_param(params, "seconds"),
        },
        "LED" => ActionStep::SignalLed {
            color: label_param(params, "color"),
            duration: number_param(params, "duration"),
        },
        "BEEP" => ActionStep::SignalBeep {
            repeat: count_param(params, "repeat"),
            pattern: label_param(params, "pattern"),
        },
        other => ActionStep::Unknown(other.to_owned()),
    }
}

// ── Parameter helpers ────────────────────────────────────────────────────────

/// A string parameter. Any other type is ignored with a warning.
fn text_param(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => {
            warn!("parameter {key} should be a string, got {other}; using default");
            None
        }
    }
}

/// A label such as an LED colour. Non-strings are kept as their JSON text so
/// the effector reports them as unknown labels instead of silently using the
/// default.
fn label_param(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::Null => None,
        value => Some(tag_text(value)),
    }
}

/// A list of labels. A single label is accepted as a one-element list.
fn label_list_param(params: &Map<String, Value>, key: &str) -> Vec<String> {
    match params.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(tag_text)
            .collect(),
        Some(value) => vec![tag_text(value)],
    }
}

/// A number given as a JSON number or a numeric string.
fn number_param(params: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = params.get(key)?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => return None,
        _ => None,
    };
    if number.is_none() {
        warn!("parameter {key} should be numeric, got {value}; using default");
    }
    number
}

/// A non-negative count. Fractions are truncated and negatives clamp to zero.
fn count_param(params: &Map<String, Value>, key: &str) -> Option<u32> {
    number_param(params, key).map(|n| {
        if n.is_finite() && n > 0.0 {
            n.min(u32::MAX as f64) as u32
        } else {
            0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_records_in_order() {
        // Arrange
        let payload = r#"[
            {"Command": "HID", "Parameters": {"Key": "UP"}},
            {"Command": "TYPE", "Parameters": {"Text": "hi"}},
            {"Command": "DELETE_TEXT", "Parameters": {"Text": "hi"}},
            {"Command": "DELETE_ROW", "Parameters": {"Method": "BIOS", "Time": 45}},
            {"Command": "LED", "Parameters": {"Color": "Red", "Duration": 1.0}},
            {"Command": "BEEP", "Parameters": {"Repeat": 2, "Pattern": "Short"}},
            {"Command": "WAIT", "Parameters": {"Seconds": 0.5}}
        ]"#;

        // Act
        let steps = parse_script(payload).unwrap();

        // Assert
        assert_eq!(
            steps,
            vec![
                ActionStep::PressKey("UP".into()),
                ActionStep::TypeText("hi".into()),
                ActionStep::DeleteText("hi".into()),
                ActionStep::DeleteRow {
                    method: "BIOS".into(),
                    time_hint: 45.0
                },
                ActionStep::SignalLed {
                    color: Some("Red".into()),
                    duration: Some(1.0)
                },
                ActionStep::SignalBeep {
                    repeat: Some(2),
                    pattern: Some("Short".into())
                },
                ActionStep::Wait { seconds: Some(0.5) },
            ]
        );
    }

    #[test]
    fn test_parse_generator_records_translate_to_same_steps() {
        let payload = r#"[
            {"cmd": "HID", "params": {"action": "TYPE", "text": "Ab3"}},
            {"cmd": "WAIT", "params": {"seconds": 2.5}},
            {"cmd": "HID", "params": {"action": "DELETE", "count": 3}},
            {"cmd": "HID", "params": {"action": "PRESS", "key": "LEFT"}}
        ]"#;

        let steps = parse_script(payload).unwrap();

        assert_eq!(
            steps,
            vec![
                ActionStep::TypeText("Ab3".into()),
                ActionStep::Wait { seconds: Some(2.5) },
                ActionStep::Backspace(3),
                ActionStep::PressKey("LEFT".into()),
            ]
        );
    }

    #[test]
    fn test_non_scripts_are_classified_with_the_right_error() {
        assert!(matches!(parse_script(""), Err(ScriptError::NotJson(_))));
        assert!(matches!(parse_script("hello world"), Err(ScriptError::NotJson(_))));
        assert!(matches!(
            parse_script(r#"[{"Command": "TYPE""#),
            Err(ScriptError::NotJson(_))
        ));
        assert!(matches!(
            parse_script(r#"{"Command": "TYPE"}"#),
            Err(ScriptError::NotAnArray)
        ));
        assert!(matches!(parse_script("42"), Err(ScriptError::NotAnArray)));
        assert!(matches!(
            parse_script(r#"[{"Command": "WAIT"}, "oops"]"#),
            Err(ScriptError::RecordNotObject { index: 1 })
        ));
        assert!(matches!(
            parse_script(r#"[{"Command": "TYPE", "Parameters": "hi"}]"#),
            Err(ScriptError::ParametersNotObject { index: 0 })
        ));
    }

    #[test]
    fn test_unknown_and_missing_tags_become_unknown_steps() {
        let steps =
            parse_script(r#"[{"Command": "MULTI_LED"}, {"Parameters": {}}, {"Command": 7}]"#)
                .unwrap();

        assert_eq!(
            steps,
            vec![
                ActionStep::Unknown("MULTI_LED".into()),
                ActionStep::Unknown(String::new()),
                ActionStep::Unknown("7".into()),
            ]
        );
    }

    #[test]
    fn test_led_multi_collects_colours() {
        let steps = parse_script(
            r#"[{"Command": "LED_MULTI", "Parameters": {"Colors": ["Red", "Blue"], "Duration": 2}},
                {"Command": "LED_MULTI", "Parameters": {"Colors": "Yellow"}},
                {"Command": "LED_MULTI"}]"#,
        )
        .unwrap();

        assert_eq!(
            steps,
            vec![
                ActionStep::SignalLeds {
                    colors: vec!["Red".into(), "Blue".into()],
                    duration: Some(2.0)
                },
                ActionStep::SignalLeds {
                    colors: vec!["Yellow".into()],
                    duration: None
                },
                ActionStep::SignalLeds {
                    colors: Vec::new(),
                    duration: None
                },
            ]
        );
        assert_eq!(steps[0].tag(), "LED_MULTI");
    }

    #[test]
    fn test_missing_parameters_use_defaults() {
        let steps = parse_script(
            r#"[{"Command": "DELETE_ROW"}, {"Command": "HID"}, {"Command": "LED", "Parameters": {}}]"#,
        )
        .unwrap();

        assert_eq!(
            steps,
            vec![
                ActionStep::DeleteRow {
                    method: DEFAULT_ROW_METHOD.into(),
                    time_hint: DEFAULT_ROW_TIME_HINT
                },
                ActionStep::PressKey(String::new()),
                ActionStep::SignalLed {
                    color: None,
                    duration: None
                },
            ]
        );
    }

    #[test]
    fn test_numeric_strings_are_accepted_and_garbage_falls_back() {
        let steps = parse_script(
            r#"[
                {"Command": "WAIT", "Parameters": {"Seconds": "1.5"}},
                {"Command": "WAIT", "Parameters": {"Seconds": "soon"}},
                {"Command": "BEEP", "Parameters": {"Repeat": -3}},
                {"Command": "BEEP", "Parameters": {"Repeat": "2"}}
            ]"#,
        )
        .unwrap();

        assert_eq!(steps[0], ActionStep::Wait { seconds: Some(1.5) });
        assert_eq!(steps[1], ActionStep::Wait { seconds: None });
        assert_eq!(
            steps[2],
            ActionStep::SignalBeep {
                repeat: Some(0),
                pattern: None
            }
        );
        assert_eq!(
            steps[3],
            ActionStep::SignalBeep {
                repeat: Some(2),
                pattern: None
            }
        );
    }

    #[test]
    fn test_empty_array_is_an_empty_script() {
        assert_eq!(parse_script("  []\n").unwrap(), Vec::<ActionStep>::new());
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let steps = parse_script("\u{feff}[{\"Command\":\"WAIT\"}]").unwrap();
        assert_eq!(steps, vec![ActionStep::Wait { seconds: None }]);
    }

    #[test]
    fn test_tag_reports_canonical_command() {
        assert_eq!(ActionStep::Backspace(2).tag(), "DELETE_TEXT");
        assert_eq!(ActionStep::Unknown("X".into()).tag(), "X");
    }
}
