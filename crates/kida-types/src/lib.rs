//! `kida-types` – shared vocabulary for the KIDA control core.
//!
//! Every other crate in the workspace speaks in these types: the motion
//! [`Command`] vocabulary written to the motor boards, the [`DeviceId`] of
//! each independently addressable board, the explicit [`SensorChannel`] enum
//! and its [`RawSensorReading`] / [`ParsedSensorSample`] forms, the operating
//! [`Mode`], and the error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

/// A motion directive (or opaque device string) sent to a board.
///
/// The seven motion variants serialise to the exact wire words the motor
/// firmware understands.  Everything else (speed settings, light toggles,
/// control-mode notifications) travels as [`Command::Device`] and is passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    SlightLeft,
    SlightRight,
    Stop,
    /// Free-form device-specific string, e.g. `"SPEED:250"` or `"LIGHT_FRONT_ON"`.
    Device(String),
}

impl Command {
    /// The motion vocabulary, in wire order.
    pub const MOTION: [Command; 7] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::SlightLeft,
        Command::SlightRight,
        Command::Stop,
    ];

    /// Build an opaque device command.
    pub fn device(raw: impl Into<String>) -> Self {
        Command::Device(raw.into())
    }

    /// Wire representation of this command.
    pub fn as_str(&self) -> &str {
        match self {
            Command::Forward => "FORWARD",
            Command::Backward => "BACKWARD",
            Command::Left => "LEFT",
            Command::Right => "RIGHT",
            Command::SlightLeft => "SLIGHT_LEFT",
            Command::SlightRight => "SLIGHT_RIGHT",
            Command::Stop => "STOP",
            Command::Device(raw) => raw,
        }
    }

    /// `true` for the seven motion directives.
    pub fn is_motion(&self) -> bool {
        !matches!(self, Command::Device(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Command {
    fn from(raw: &str) -> Self {
        Command::MOTION
            .into_iter()
            .find(|motion| motion.as_str() == raw)
            .unwrap_or_else(|| Command::Device(raw.to_string()))
    }
}

impl From<String> for Command {
    fn from(raw: String) -> Self {
        match Command::from(raw.as_str()) {
            Command::Device(_) => Command::Device(raw),
            motion => motion,
        }
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        match command {
            Command::Device(raw) => raw,
            motion => motion.as_str().to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Devices
// ────────────────────────────────────────────────────────────────────────────

/// Logical identifier of an independently addressable actuator group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Identifier of the chassis board (drive motors, laser, ultrasonics).
    pub const CHASSIS: &'static str = "dev00";
    /// Identifier of the accessory board (lights, line and ambient sensors).
    pub const ACCESSORY: &'static str = "dev01";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn chassis() -> Self {
        Self::new(Self::CHASSIS)
    }

    pub fn accessory() -> Self {
        Self::new(Self::ACCESSORY)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensors
// ────────────────────────────────────────────────────────────────────────────

/// Every sensor channel reported by the two boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorChannel {
    /// Forward-facing laser range finder (cm).
    Laser,
    /// Left ultrasonic range finder (cm).
    Ultrasonic0,
    /// Right ultrasonic range finder (cm).
    Ultrasonic1,
    LineLeft,
    LineMid,
    LineRight,
    Photo,
    Uv,
    Metal,
    BallSwitch,
    Motion,
    Servo,
    Button,
    MotorSpeed,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 14] = [
        SensorChannel::Laser,
        SensorChannel::Ultrasonic0,
        SensorChannel::Ultrasonic1,
        SensorChannel::LineLeft,
        SensorChannel::LineMid,
        SensorChannel::LineRight,
        SensorChannel::Photo,
        SensorChannel::Uv,
        SensorChannel::Metal,
        SensorChannel::BallSwitch,
        SensorChannel::Motion,
        SensorChannel::Servo,
        SensorChannel::Button,
        SensorChannel::MotorSpeed,
    ];

    /// Tag used by the board firmware when reporting this channel.
    pub fn tag(self) -> &'static str {
        match self {
            SensorChannel::Laser => "LASER",
            SensorChannel::Ultrasonic0 => "ULTRASONIC0",
            SensorChannel::Ultrasonic1 => "ULTRASONIC1",
            SensorChannel::LineLeft => "LF_LEFT",
            SensorChannel::LineMid => "LF_MID",
            SensorChannel::LineRight => "LF_RIGHT",
            SensorChannel::Photo => "PHOTO",
            SensorChannel::Uv => "UV",
            SensorChannel::Metal => "METAL",
            SensorChannel::BallSwitch => "BALL",
            SensorChannel::Motion => "MOTION",
            SensorChannel::Servo => "SERVO",
            SensorChannel::Button => "BUTTON",
            SensorChannel::MotorSpeed => "SPEED",
        }
    }

    /// Resolve a firmware tag (case-sensitive, surrounding whitespace ignored).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL.into_iter().find(|channel| channel.tag() == tag)
    }

    /// Ultrasonic channels report garbage below a minimum valid distance.
    pub fn is_ultrasonic(self) -> bool {
        matches!(self, SensorChannel::Ultrasonic0 | SensorChannel::Ultrasonic1)
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Last-known raw value of one sensor channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawSensorReading {
    /// Nothing has been received on this channel yet.
    #[default]
    Absent,
    /// A formatted reading carrying its tag, e.g. `"LASER:111"`.
    Text(String),
    /// A bare numeric reading.
    Number(i64),
}

impl RawSensorReading {
    pub fn text(raw: impl Into<String>) -> Self {
        RawSensorReading::Text(raw.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RawSensorReading::Absent)
    }
}

/// Typed distances and reflectance values derived once per control tick.
///
/// `None` means "no valid reading".  It is never conflated with `0`, which is
/// a legitimate "obstacle touching the sensor" distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSensorSample {
    pub laser: Option<i32>,
    pub ultrasonic_left: Option<i32>,
    pub ultrasonic_right: Option<i32>,
    pub line_left: Option<i32>,
    pub line_mid: Option<i32>,
    pub line_right: Option<i32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Mode
// ────────────────────────────────────────────────────────────────────────────

/// Who is authorised to issue movement commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Manual,
    Autonomous,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Manual => f.write_str("Keyboard"),
            Mode::Autonomous => f.write_str("Autonomous"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failure to deliver a command to a motion transport.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    #[error("device '{0}' is not registered")]
    UnknownDevice(String),

    #[error("device '{0}' is not connected or closed")]
    NotConnected(String),

    #[error("write to '{device}' timed out")]
    TimedOut { device: String },

    #[error("write to '{device}' failed: {details}")]
    Write { device: String, details: String },
}

/// Workspace-wide error type.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum KidaError {
    #[error("Transport Error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("I/O Error: {0}")]
    Io(String),
}

impl From<std::io::Error> for KidaError {
    fn from(err: std::io::Error) -> Self {
        KidaError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_commands_use_exact_wire_words() {
        let wire: Vec<&str> = Command::MOTION.iter().map(Command::as_str).collect();
        assert_eq!(
            wire,
            ["FORWARD", "BACKWARD", "LEFT", "RIGHT", "SLIGHT_LEFT", "SLIGHT_RIGHT", "STOP"]
        );
        for motion in Command::MOTION {
            assert!(motion.is_motion());
            assert_eq!(Command::from(motion.as_str()), motion);
        }
    }

    #[test]
    fn unknown_words_stay_opaque() {
        let cmd = Command::from("SPEED:250");
        assert_eq!(cmd, Command::Device("SPEED:250".to_string()));
        assert!(!cmd.is_motion());
        assert_eq!(cmd.to_string(), "SPEED:250");
    }

    #[test]
    fn command_parsing_is_case_sensitive() {
        assert_eq!(Command::from("STOP"), Command::Stop);
        assert_eq!(Command::from("stop"), Command::device("stop"));
    }

    #[test]
    fn command_serializes_as_wire_string() {
        let json = serde_json::to_string(&Command::SlightLeft).unwrap();
        assert_eq!(json, "\"SLIGHT_LEFT\"");
        let back: Command = serde_json::from_str("\"LIGHT_FRONT_ON\"").unwrap();
        assert_eq!(back, Command::device("LIGHT_FRONT_ON"));
    }

    #[test]
    fn sensor_channel_tags_resolve() {
        for channel in SensorChannel::ALL {
            assert_eq!(SensorChannel::from_tag(channel.tag()), Some(channel));
        }
        assert_eq!(SensorChannel::from_tag(" LASER "), Some(SensorChannel::Laser));
        assert_eq!(SensorChannel::from_tag("ULTRASONIC 0"), None);
    }

    #[test]
    fn only_distance_sidecars_are_ultrasonic() {
        let ultrasonic: Vec<_> = SensorChannel::ALL
            .into_iter()
            .filter(|c| c.is_ultrasonic())
            .collect();
        assert_eq!(ultrasonic, [SensorChannel::Ultrasonic0, SensorChannel::Ultrasonic1]);
    }

    #[test]
    fn missing_reading_defaults_to_absent() {
        assert!(RawSensorReading::default().is_absent());
        assert_eq!(ParsedSensorSample::default().laser, None);
    }

    #[test]
    fn device_ids_for_both_boards() {
        assert_eq!(DeviceId::chassis().as_str(), "dev00");
        assert_eq!(DeviceId::accessory().to_string(), "dev01");
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::Write {
            device: "dev00".to_string(),
            details: "broken pipe".to_string(),
        };
        assert!(err.to_string().contains("dev00"));

        let wrapped: KidaError = err.into();
        assert!(wrapped.to_string().contains("Transport Error"));
    }
}
