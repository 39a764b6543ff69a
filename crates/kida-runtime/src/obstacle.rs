//! Obstacle-avoidance policy.
//!
//! A strict decision tree over the forward laser and the two side
//! ultrasonic sensors.  A missing reading counts as "clear": an unplugged
//! side sensor must not freeze the robot.
//!
//! | Laser blocked | Left clear | Right clear | Command |
//! |---|---|---|---|
//! | yes | yes | yes | toward the farther side (ties `LEFT`) |
//! | yes | yes | no | `LEFT` |
//! | yes | no | yes | `RIGHT` |
//! | yes | no | no | `STOP` |
//! | no | left too close | | `RIGHT` if right clear, else `STOP` |
//! | no | | right too close | `LEFT` if left clear, else `STOP` |
//! | no | | | `FORWARD` |

use std::time::Instant;

use kida_types::{Command, ParsedSensorSample};
use serde::{Deserialize, Serialize};

use crate::policy::{Decision, Policy, format_reading};

/// Forward laser distance (cm) below which the path ahead is blocked.
pub const SAFE_LASER_DISTANCE: i32 = 40;
/// Side ultrasonic distance (cm) at or below which that side is blocked.
pub const SAFE_ULTRASONIC_DISTANCE: i32 = 20;

/// Tunable safety distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub safe_laser_distance: i32,
    pub safe_ultrasonic_distance: i32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            safe_laser_distance: SAFE_LASER_DISTANCE,
            safe_ultrasonic_distance: SAFE_ULTRASONIC_DISTANCE,
        }
    }
}

/// Decide with the default safety distances.
pub fn decide(laser: Option<i32>, us_left: Option<i32>, us_right: Option<i32>) -> Command {
    decide_with(&ObstacleConfig::default(), laser, us_left, us_right)
}

/// Decide with explicit safety distances.
pub fn decide_with(
    config: &ObstacleConfig,
    laser: Option<i32>,
    us_left: Option<i32>,
    us_right: Option<i32>,
) -> Command {
    let safe_us = config.safe_ultrasonic_distance;
    let left_clear = us_left.is_none_or(|d| d > safe_us);
    let right_clear = us_right.is_none_or(|d| d > safe_us);

    if laser.is_some_and(|d| d < config.safe_laser_distance) {
        return match (left_clear, right_clear) {
            (true, true) => {
                if us_left.unwrap_or(safe_us) >= us_right.unwrap_or(safe_us) {
                    Command::Left
                } else {
                    Command::Right
                }
            }
            (true, false) => Command::Left,
            (false, true) => Command::Right,
            (false, false) => Command::Stop,
        };
    }

    if us_left.is_some_and(|d| d < safe_us) {
        return if right_clear { Command::Right } else { Command::Stop };
    }
    if us_right.is_some_and(|d| d < safe_us) {
        return if left_clear { Command::Left } else { Command::Stop };
    }
    Command::Forward
}

/// [`Policy`] wrapper around [`decide_with`].
#[derive(Debug, Clone, Default)]
pub struct ObstacleAvoidance {
    config: ObstacleConfig,
}

impl ObstacleAvoidance {
    pub fn new(config: ObstacleConfig) -> Self {
        Self { config }
    }
}

impl Policy for ObstacleAvoidance {
    fn name(&self) -> &'static str {
        "ObstacleAvoidance"
    }

    fn step(&mut self, sample: &ParsedSensorSample, _now: Instant) -> Decision {
        let command = decide_with(
            &self.config,
            sample.laser,
            sample.ultrasonic_left,
            sample.ultrasonic_right,
        );
        let status = format!(
            "{}: {command} | Sensors: laser={}, us_left={}, us_right={}",
            self.name(),
            format_reading(sample.laser),
            format_reading(sample.ultrasonic_left),
            format_reading(sample.ultrasonic_right),
        );
        Decision { command, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_ahead_turns_toward_the_clear_side() {
        assert_eq!(decide(Some(30), Some(25), Some(10)), Command::Left);
        assert_eq!(decide(Some(30), Some(10), Some(25)), Command::Right);
    }

    #[test]
    fn blocked_everywhere_stops() {
        assert_eq!(decide(Some(30), Some(10), Some(10)), Command::Stop);
        assert_eq!(decide(Some(0), Some(20), Some(20)), Command::Stop);
    }

    #[test]
    fn blocked_ahead_with_both_sides_clear_prefers_the_farther_side() {
        assert_eq!(decide(Some(30), Some(50), Some(80)), Command::Right);
        assert_eq!(decide(Some(30), Some(80), Some(50)), Command::Left);
        // Ties go left.
        assert_eq!(decide(Some(30), Some(60), Some(60)), Command::Left);
        // A missing side counts as exactly the safe distance.
        assert_eq!(decide(Some(30), None, Some(21)), Command::Right);
        assert_eq!(decide(Some(30), None, None), Command::Left);
    }

    #[test]
    fn side_obstacle_without_laser_reading() {
        assert_eq!(decide(None, Some(15), None), Command::Right);
        assert_eq!(decide(None, None, Some(15)), Command::Left);
        assert_eq!(decide(None, Some(15), Some(15)), Command::Stop);
    }

    #[test]
    fn exactly_safe_side_distance_is_neither_clear_nor_close() {
        // 20 is not > 20 (not clear) and not < 20 (not close).
        assert_eq!(decide(Some(50), Some(20), Some(20)), Command::Forward);
        assert_eq!(decide(Some(10), Some(20), Some(20)), Command::Stop);
    }

    #[test]
    fn open_space_drives_forward() {
        assert_eq!(decide(Some(50), Some(50), Some(50)), Command::Forward);
        assert_eq!(decide(None, None, None), Command::Forward);
        assert_eq!(decide(Some(40), Some(21), Some(21)), Command::Forward);
    }

    #[test]
    fn custom_distances_are_honoured() {
        let config = ObstacleConfig {
            safe_laser_distance: 100,
            safe_ultrasonic_distance: 5,
        };
        assert_eq!(decide_with(&config, Some(60), Some(10), Some(8)), Command::Left);
    }

    #[test]
    fn status_line_lists_raw_sensors() {
        let mut policy = ObstacleAvoidance::default();
        let sample = ParsedSensorSample {
            laser: Some(30),
            ultrasonic_left: Some(25),
            ultrasonic_right: None,
            ..Default::default()
        };
        let decision = policy.step(&sample, Instant::now());
        assert_eq!(decision.command, Command::Left);
        assert_eq!(
            decision.status,
            "ObstacleAvoidance: LEFT | Sensors: laser=30, us_left=25, us_right=N/A"
        );
    }
}
