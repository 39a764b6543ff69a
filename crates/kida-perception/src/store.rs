//! Sensor State Store.
//!
//! A shared, continuously updated map from [`SensorChannel`] to the last
//! known [`RawSensorReading`].  Reader threads write into it; the control
//! loop reads a consistent snapshot once per tick.  Last write wins and
//! older unread values are simply overwritten.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use kida_perception::store::SensorStore;
//! use kida_types::{RawSensorReading, SensorChannel};
//!
//! let store = Arc::new(SensorStore::new());
//! store.set(SensorChannel::Laser, RawSensorReading::text("LASER:35"));
//!
//! assert_eq!(store.sample().laser, Some(35));
//! assert!(store.get(SensorChannel::Ultrasonic0).is_absent());
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use kida_types::{ParsedSensorSample, RawSensorReading, SensorChannel};

use crate::parser;

/// Thread-safe last-value store for every sensor channel.
///
/// Share it as `Arc<SensorStore>`.  A lock poisoned by a panicking writer is
/// recovered transparently: the map only ever holds complete values.
#[derive(Debug, Default)]
pub struct SensorStore {
    readings: RwLock<HashMap<SensorChannel, RawSensorReading>>,
}

impl SensorStore {
    /// Create an empty store; every channel reads as [`RawSensorReading::Absent`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the reading for `channel`.
    pub fn set(&self, channel: SensorChannel, reading: RawSensorReading) {
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, reading);
    }

    /// Last reading for `channel`, or [`RawSensorReading::Absent`] when none
    /// has arrived yet.
    pub fn get(&self, channel: SensorChannel) -> RawSensorReading {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Copy of every channel that has reported at least once.
    pub fn snapshot(&self) -> HashMap<SensorChannel, RawSensorReading> {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Parse the current readings into a [`ParsedSensorSample`].
    ///
    /// The snapshot is taken under a single read lock so every field of the
    /// sample comes from the same instant.
    pub fn sample(&self) -> ParsedSensorSample {
        let readings = self.readings.read().unwrap_or_else(PoisonError::into_inner);
        parser::sample_from(&readings)
    }

    /// Forget every reading.
    pub fn clear(&self) {
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn missing_channel_reads_absent() {
        let store = SensorStore::new();
        assert_eq!(store.get(SensorChannel::Laser), RawSensorReading::Absent);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn last_write_wins() {
        let store = SensorStore::new();
        store.set(SensorChannel::Laser, RawSensorReading::text("LASER:10"));
        store.set(SensorChannel::Laser, RawSensorReading::Number(90));
        assert_eq!(store.get(SensorChannel::Laser), RawSensorReading::Number(90));
    }

    #[test]
    fn sample_applies_parser_rules() {
        let store = SensorStore::new();
        store.set(SensorChannel::Ultrasonic0, RawSensorReading::text("ULTRASONIC0:4"));
        store.set(SensorChannel::Ultrasonic1, RawSensorReading::text("ULTRASONIC1:25"));
        store.set(SensorChannel::LineLeft, RawSensorReading::text("LF_LEFT: N/A"));

        let sample = store.sample();
        assert_eq!(sample.ultrasonic_left, None);
        assert_eq!(sample.ultrasonic_right, Some(25));
        assert_eq!(sample.line_left, None);
    }

    #[test]
    fn clear_resets_every_channel() {
        let store = SensorStore::new();
        store.set(SensorChannel::Photo, RawSensorReading::Number(1));
        store.clear();
        assert!(store.get(SensorChannel::Photo).is_absent());
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(SensorStore::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for v in 0..200 {
                        store.set(SensorChannel::Laser, RawSensorReading::Number(i * 1000 + v));
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            // Every observed value must be one some writer actually wrote.
            if let Some(v) = store.sample().laser {
                assert!((0..4000).contains(&v));
            }
        }
        for w in writers {
            w.join().unwrap();
        }
        assert!(!store.get(SensorChannel::Laser).is_absent());
    }
}
