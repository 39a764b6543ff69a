//! Sensor Parser.
//!
//! Turns [`RawSensorReading`]s into typed integer readings.  Every failure
//! degrades to `None`; nothing in this module panics or returns an error.
//!
//! Accepted forms:
//!
//! | Raw | Result |
//! |---|---|
//! | `Absent` | `None` |
//! | `Number(n)` | `Some(n)` when `n` fits in `i32` |
//! | `Text("LASER:111")` | `Some(111)` |
//! | `Text("LF_LEFT: 500")` | `Some(500)` (whitespace around the value is ignored) |
//! | `Text("ULTRASONIC0: N/A")`, `Text("111")` | `None` |
//!
//! Ultrasonic channels additionally discard values below
//! [`MIN_ULTRASONIC_VALID`], which the range finders emit while booting or
//! when an echo is lost.

use std::collections::HashMap;

use kida_types::{ParsedSensorSample, RawSensorReading, SensorChannel};

/// Smallest ultrasonic distance (cm) treated as a real echo.
pub const MIN_ULTRASONIC_VALID: i32 = 5;

/// Parse a raw reading into an integer.
pub fn parse(raw: &RawSensorReading) -> Option<i32> {
    match raw {
        RawSensorReading::Absent => None,
        RawSensorReading::Number(n) => i32::try_from(*n).ok(),
        RawSensorReading::Text(text) => parse_tagged_text(text),
    }
}

/// Parse a reading for a specific channel, applying the channel's validity
/// floor.
pub fn parse_channel(channel: SensorChannel, raw: &RawSensorReading) -> Option<i32> {
    let value = parse(raw)?;
    if channel.is_ultrasonic() && value < MIN_ULTRASONIC_VALID {
        return None;
    }
    Some(value)
}

/// Find `tag:value` among space- or pipe-delimited fields of `text` and parse
/// the value.
///
/// Bracketed groups are searched too, so `extract_tagged("LF[L:120 M:80
/// R:40]", "M")` yields `Some(80)`.
pub fn extract_tagged(text: &str, tag: &str) -> Option<i32> {
    text.split(|c: char| c == '|' || c == '[' || c == ']' || c.is_whitespace())
        .filter_map(|field| field.split_once(':'))
        .find(|(key, _)| key.trim() == tag)
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Build the per-tick sample from a store snapshot.
pub fn sample_from(snapshot: &HashMap<SensorChannel, RawSensorReading>) -> ParsedSensorSample {
    let read = |channel: SensorChannel| {
        snapshot
            .get(&channel)
            .and_then(|raw| parse_channel(channel, raw))
    };
    ParsedSensorSample {
        laser: read(SensorChannel::Laser),
        ultrasonic_left: read(SensorChannel::Ultrasonic0),
        ultrasonic_right: read(SensorChannel::Ultrasonic1),
        line_left: read(SensorChannel::LineLeft),
        line_mid: read(SensorChannel::LineMid),
        line_right: read(SensorChannel::LineRight),
    }
}

fn parse_tagged_text(text: &str) -> Option<i32> {
    text.split(':').nth(1)?.trim().parse().ok()
}
