//! PID line-following policy.
//!
//! The three reflectance sensors are reduced to a signed position error
//! (negative when the line is to the left, positive to the right) and fed
//! through a discrete [`PidController`].  The controller output is then
//! quantised into the motion vocabulary by [`steer`].
//!
//! # Example
//!
//! ```rust
//! use kida_runtime::pid::PidController;
//!
//! let mut pid = PidController::new(1.0, 0.1, 0.5);
//! // Line half a bar to the left: error = -50.
//! let output = pid.update(-50.0);
//! assert!((output - -80.0).abs() < 1e-4);
//! ```

use std::time::Instant;

use kida_types::{Command, ParsedSensorSample};
use serde::{Deserialize, Serialize};

use crate::line_follower::{LineConfig, LineSearch};
use crate::policy::{Decision, Policy, format_reading};

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

/// Discrete PID controller stepped once per control tick.
///
/// The integral is a plain running sum of errors and the derivative is the
/// difference from the previous error, which starts at zero.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    integral: f32,
    last_error: f32,
    output_min: f32,
    output_max: f32,
}

impl PidController {
    /// Create a controller with unclamped output.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            last_error: 0.0,
            output_min: f32::NEG_INFINITY,
            output_max: f32::INFINITY,
        }
    }

    /// Clamp the output to `[min, max]`.  The integral term is held inside
    /// the same range.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        self.output_min = min;
        self.output_max = max;
    }

    /// Fold `error` into the controller and return the new output.
    pub fn update(&mut self, error: f32) -> f32 {
        self.integral += error;
        let raw_i = self.ki * self.integral;
        let i = raw_i.clamp(self.output_min, self.output_max);
        if i != raw_i && self.ki.abs() > f32::EPSILON {
            self.integral = i / self.ki;
        }
        let derivative = error - self.last_error;
        self.last_error = error;

        (self.kp * error + i + self.kd * derivative).clamp(self.output_min, self.output_max)
    }

    /// Zero the integral and the previous error.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Error and steering
// ────────────────────────────────────────────────────────────────────────────

/// Signed line position in `[-100, 100]`.
///
/// `None` when any sensor is missing or no sensor is over the line.
pub fn position_error(
    left: Option<i32>,
    middle: Option<i32>,
    right: Option<i32>,
    threshold: i32,
) -> Option<f32> {
    let on = |v: i32| if v > threshold { 1.0_f32 } else { 0.0 };
    let (l, m, r) = (on(left?), on(middle?), on(right?));
    let count = l + m + r;
    if count == 0.0 {
        return None;
    }
    Some((r - l) / count.max(1.0) * 100.0)
}

/// What the PID stage wants the robot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Steering {
    Drive(Command),
    /// No line under the sensors; defer to line search.
    Search,
}

/// Output bands for turning the controller output into a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// `|output|` below this drives straight.
    pub forward_band: f32,
    /// `|output|` beyond this turns hard instead of slightly.
    pub turn_band: f32,
    /// Output and integral term are held inside `[-limit, limit]`.
    pub output_limit: f32,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.1,
            kd: 0.5,
            forward_band: 10.0,
            turn_band: 20.0,
            output_limit: 100.0,
        }
    }
}

/// Quantise a controller output.
pub fn steer(output: f32, config: &PidConfig) -> Command {
    if output.abs() < config.forward_band {
        Command::Forward
    } else if output < -config.turn_band {
        Command::Left
    } else if output < -config.forward_band {
        Command::SlightLeft
    } else if output > config.turn_band {
        Command::Right
    } else if output > config.forward_band {
        Command::SlightRight
    } else {
        Command::Forward
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────────────────────────────────────

/// Line follower steering by PID output, with the same lost-line search as
/// the threshold follower.
#[derive(Debug, Clone)]
pub struct PidLineFollower {
    config: PidConfig,
    threshold: i32,
    controller: PidController,
    search: LineSearch,
}

impl PidLineFollower {
    pub fn new(config: PidConfig, line: &LineConfig) -> Self {
        let mut controller = PidController::new(config.kp, config.ki, config.kd);
        let limit = config.output_limit.abs();
        controller.set_output_limits(-limit, limit);
        Self {
            controller,
            config,
            threshold: line.line_threshold,
            search: LineSearch::from_config(line),
        }
    }

    /// Run the controller on one sample without touching line search.
    pub fn steering(&mut self, sample: &ParsedSensorSample) -> Steering {
        match position_error(sample.line_left, sample.line_mid, sample.line_right, self.threshold) {
            Some(error) => Steering::Drive(steer(self.controller.update(error), &self.config)),
            None => Steering::Search,
        }
    }

    pub fn search(&self) -> &LineSearch {
        &self.search
    }
}

impl Default for PidLineFollower {
    fn default() -> Self {
        Self::new(PidConfig::default(), &LineConfig::default())
    }
}

impl Policy for PidLineFollower {
    fn name(&self) -> &'static str {
        "PID_LineFollower"
    }

    fn step(&mut self, sample: &ParsedSensorSample, now: Instant) -> Decision {
        let command = match self.steering(sample) {
            Steering::Drive(command) => {
                self.search.reset();
                command
            }
            Steering::Search => self.search.step(now),
        };

        let error = position_error(sample.line_left, sample.line_mid, sample.line_right, self.threshold)
            .map_or_else(|| "N/A".to_string(), |e| format!("{e:.1}"));
        let status = format!(
            "{}: {command} | Error: {error} | L={}, M={}, R={}",
            self.name(),
            format_reading(sample.line_left),
            format_reading(sample.line_mid),
            format_reading(sample.line_right),
        );
        Decision { command, status }
    }

    fn reset(&mut self) {
        self.controller.reset();
        self.search.reset();
    }
}
