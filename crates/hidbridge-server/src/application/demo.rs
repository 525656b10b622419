//! Built-in hardware test sequence (`hidbridge demo`).
//!
//! Exercises every output once: the three arrow keys, typing in two chunks,
//! deleting what was typed, and the LEDs. It goes through the normal
//! interpreter, so it also proves the script path end to end. Focus a text
//! field on the USB host during the countdown.

use std::time::Duration;

use hidbridge_core::parse_script;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::application::interpret::{ActionInterpreter, ScriptReport};

/// Delay before the first step.
pub const COUNTDOWN: Duration = Duration::from_secs(3);

fn record(command: &str, parameters: Value) -> Value {
    json!({ "Command": command, "Parameters": parameters })
}

fn led(color: &str, duration: f64) -> Value {
    record("LED", json!({ "Color": color, "Duration": duration }))
}

fn wait(seconds: f64) -> Value {
    record("WAIT", json!({ "Seconds": seconds }))
}

fn key(name: &str) -> Value {
    record("HID", json!({ "Key": name }))
}

/// The demo as a command-list payload, exactly as a peer would send it.
pub fn demo_script() -> String {
    json!([
        led("Red", 1.0),
        wait(1.0),
        key("UP"),
        wait(0.5),
        led("Blue", 1.0),
        wait(1.0),
        key("DOWN"),
        wait(0.5),
        led("Yellow", 1.0),
        wait(1.0),
        key("LEFT"),
        wait(0.5),
        record(
            "LED_MULTI",
            json!({ "Colors": ["Red", "Blue", "Yellow"], "Duration": 2.0 })
        ),
        wait(2.0),
        record("TYPE", json!({ "Text": "Assu" })),
        wait(2.0),
        record("TYPE", json!({ "Text": "rritz" })),
        wait(2.0),
        record("DELETE_TEXT", json!({ "Text": "Assurritz" })),
        wait(2.0),
        led("Blue", 1.0),
        wait(1.0),
        key("DOWN"),
    ])
    .to_string()
}

/// Counts down, then runs [`demo_script`].
pub async fn run_demo(interpreter: &mut ActionInterpreter) -> ScriptReport {
    info!(
        "starting test sequence in {} seconds; focus a text input field",
        COUNTDOWN.as_secs()
    );
    sleep(COUNTDOWN).await;

    let steps = match parse_script(&demo_script()) {
        Ok(steps) => steps,
        Err(e) => {
            warn!("demo script rejected: {e}");
            return ScriptReport::default();
        }
    };
    let report = interpreter.execute(&steps).await;
    info!("test sequence complete");
    report
}
