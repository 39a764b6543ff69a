//! Serial line ingestion.
//!
//! Both boards print one report per line.  The chassis board (`dev00`) emits
//! single `TAG:value` readings; the accessory board (`dev01`) emits a
//! pipe-delimited status summary plus occasional free-text alerts:
//!
//! ```text
//! LASER:111
//! ULTRASONIC0:8
//! MOTION:0 | PHOTO:512 | UV:3 | METAL:0 | BALL:1 | LF[L:120 M:80 R:40]
//! METAL DETECTED
//! ```
//!
//! Every recognised field is stored as `Text("TAG:value")` so the
//! [`parser`](crate::parser) sees the same shape whichever board produced it.
//! Either board may send either form; the device only labels log output.

use kida_types::{DeviceId, RawSensorReading, SensorChannel};
use tracing::{debug, info};

use crate::parser;
use crate::store::SensorStore;

/// Free-text alerts printed by the accessory board.
pub const ALERTS: [&str; 3] = ["Motion detected", "METAL DETECTED", "Ball switch triggered"];

/// What [`ingest_line`] did with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// This many channels were updated.
    Updated(usize),
    /// The line was a board alert.
    Alert(String),
    /// Nothing in the line was understood.
    Unrecognised,
}

/// Apply one line received from `device` to `store`.
pub fn ingest_line(store: &SensorStore, device: &DeviceId, line: &str) -> Ingested {
    let line = line.trim();
    if line.is_empty() {
        return Ingested::Unrecognised;
    }

    if let Some(alert) = ALERTS.iter().find(|alert| line.contains(**alert)) {
        info!(device = %device, alert = *alert, "board alert");
        return Ingested::Alert((*alert).to_string());
    }

    let mut updated = 0;
    for field in line.split('|').map(str::trim) {
        updated += if field.starts_with("LF[") {
            ingest_line_group(store, field)
        } else {
            ingest_field(store, field)
        };
    }

    if updated == 0 {
        debug!(device = %device, line, "unrecognised sensor line");
        return Ingested::Unrecognised;
    }
    Ingested::Updated(updated)
}

/// `TAG:value` for a known tag.  The value is kept verbatim; an unparsable
/// value still overwrites the channel so stale data does not linger.
fn ingest_field(store: &SensorStore, field: &str) -> usize {
    let Some((tag, value)) = field.split_once(':') else {
        return 0;
    };
    let Some(channel) = SensorChannel::from_tag(tag) else {
        return 0;
    };
    store.set(
        channel,
        RawSensorReading::text(format!("{}:{}", channel.tag(), value.trim())),
    );
    1
}

/// `LF[L:120 M:80 R:40]` – the three line-follower reflectance values.
fn ingest_line_group(store: &SensorStore, group: &str) -> usize {
    let sensors = [
        ("L", SensorChannel::LineLeft),
        ("M", SensorChannel::LineMid),
        ("R", SensorChannel::LineRight),
    ];
    let mut updated = 0;
    for (key, channel) in sensors {
        if let Some(value) = parser::extract_tagged(group, key) {
            store.set(channel, RawSensorReading::text(format!("{}:{value}", channel.tag())));
            updated += 1;
        }
    }
    updated
}
