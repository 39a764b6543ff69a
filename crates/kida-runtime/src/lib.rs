//! `kida-runtime` – decision making and control arbitration.
//!
//! # Modules
//!
//! - [`policy`] – the [`Policy`] trait, [`PolicyKind`] selection and the
//!   [`AutonomyConfig`] tunables.
//! - [`obstacle`] – laser/ultrasonic obstacle-avoidance decision tree.
//! - [`line_follower`] – threshold line following and the [`LineSearch`]
//!   recovery state machine.
//! - [`pid`] – PID line following built on [`PidController`].
//! - [`control_loop`] – [`ControlLoop`]: fixed-rate policy driver with a
//!   guaranteed final `STOP`.
//! - [`arbiter`] – [`ModeArbiter`]: manual/autonomous switching and the
//!   autonomous worker thread.
//! - [`manual`] – [`ManualDriver`]: keyboard, gamepad, shell and voice input.
//! - [`status`] – [`StatusSink`] and the latest-line [`StatusBoard`].
//! - [`telemetry`] – `tracing` subscriber and OTLP export setup.

pub mod arbiter;
pub mod control_loop;
pub mod line_follower;
pub mod manual;
pub mod obstacle;
pub mod pid;
pub mod policy;
pub mod status;
pub mod telemetry;

pub use arbiter::{ModeArbiter, SharedMode};
pub use control_loop::{CancelToken, ControlLoop, LoopExit};
pub use line_follower::{LineSearch, ThresholdLineFollower};
pub use manual::{ManualDriver, MotionKey, TextCommand};
pub use obstacle::ObstacleAvoidance;
pub use pid::{PidController, PidLineFollower};
pub use policy::{AutonomyConfig, Decision, Policy, PolicyKind};
pub use status::{StatusBoard, StatusSink};
