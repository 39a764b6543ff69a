//! The [`Policy`] seam between the control loop and the autonomous behaviours.
//!
//! A policy turns one [`ParsedSensorSample`] into one [`Decision`].  It may
//! keep state between ticks (the line followers do) but never touches the
//! dispatcher or the store; the control loop owns both.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use kida_types::{Command, ParsedSensorSample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::line_follower::{LineConfig, ThresholdLineFollower};
use crate::obstacle::{ObstacleAvoidance, ObstacleConfig};
use crate::pid::{PidConfig, PidLineFollower};

/// Default pause between control ticks, in milliseconds.
pub const LOOP_DELAY_MS: u64 = 50;
pub const LOOP_DELAY: Duration = Duration::from_millis(LOOP_DELAY_MS);
/// Floor for a configured loop delay.
pub const MIN_LOOP_DELAY: Duration = Duration::from_millis(1);

/// What a policy wants done this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub command: Command,
    /// Human-readable summary of the decision and its inputs.
    pub status: String,
}

/// An autonomous behaviour stepped by the control loop.
pub trait Policy: Send {
    /// Label used as the status-line prefix.
    fn name(&self) -> &'static str;

    /// Decide on one sample.  `now` is injected so time-dependent
    /// behaviour can be tested without sleeping.
    fn step(&mut self, sample: &ParsedSensorSample, now: Instant) -> Decision;

    /// Forget any state carried between ticks.
    fn reset(&mut self) {}
}

/// Render an optional reading for status output.
pub(crate) fn format_reading(value: Option<i32>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Policy selection
// ────────────────────────────────────────────────────────────────────────────

/// The selectable autonomous behaviours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    #[default]
    #[serde(rename = "obstacle")]
    ObstacleAvoidance,
    #[serde(rename = "line")]
    LineFollower,
    #[serde(rename = "pid")]
    PidLineFollower,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::ObstacleAvoidance,
        PolicyKind::LineFollower,
        PolicyKind::PidLineFollower,
    ];

    /// Short name accepted by [`FromStr`] and the config file.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::ObstacleAvoidance => "obstacle",
            PolicyKind::LineFollower => "line",
            PolicyKind::PidLineFollower => "pid",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown policy '{0}' (expected obstacle, line or pid)")]
pub struct UnknownPolicy(pub String);

impl FromStr for PolicyKind {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnknownPolicy(s.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Everything needed to build and pace an autonomous policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    pub policy: PolicyKind,
    pub loop_delay_ms: u64,
    pub obstacle: ObstacleConfig,
    pub line: LineConfig,
    pub pid: PidConfig,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            loop_delay_ms: LOOP_DELAY_MS,
            obstacle: ObstacleConfig::default(),
            line: LineConfig::default(),
            pid: PidConfig::default(),
        }
    }
}

impl AutonomyConfig {
    /// Configured delay, never below [`MIN_LOOP_DELAY`].
    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms).max(MIN_LOOP_DELAY)
    }
}

/// Construct a fresh policy of the given kind.
pub fn build_policy(kind: PolicyKind, config: &AutonomyConfig) -> Box<dyn Policy> {
    match kind {
        PolicyKind::ObstacleAvoidance => Box::new(ObstacleAvoidance::new(config.obstacle)),
        PolicyKind::LineFollower => Box::new(ThresholdLineFollower::new(config.line.clone())),
        PolicyKind::PidLineFollower => {
            Box::new(PidLineFollower::new(config.pid.clone(), &config.line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_kind_parses_short_names() {
        assert_eq!("obstacle".parse(), Ok(PolicyKind::ObstacleAvoidance));
        assert_eq!(" LINE ".parse(), Ok(PolicyKind::LineFollower));
        assert_eq!("pid".parse(), Ok(PolicyKind::PidLineFollower));
        assert_eq!(
            "wander".parse::<PolicyKind>(),
            Err(UnknownPolicy("wander".to_string()))
        );
    }

    #[test]
    fn policy_kind_serde_uses_short_names() {
        for kind in PolicyKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            let back: PolicyKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn build_policy_names() {
        let config = AutonomyConfig::default();
        let names: Vec<&str> = PolicyKind::ALL
            .into_iter()
            .map(|kind| build_policy(kind, &config).name())
            .collect();
        assert_eq!(names, ["ObstacleAvoidance", "LineFollower", "PID_LineFollower"]);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: AutonomyConfig =
            serde_json::from_str(r#"{"policy":"pid","line":{"line_threshold":300}}"#).unwrap();
        assert_eq!(config.policy, PolicyKind::PidLineFollower);
        assert_eq!(config.line.line_threshold, 300);
        assert_eq!(config.line.max_search_turns, 6);
        assert_eq!(config.loop_delay(), LOOP_DELAY);
    }

    #[test]
    fn zero_loop_delay_is_floored() {
        let config = AutonomyConfig {
            loop_delay_ms: 0,
            ..AutonomyConfig::default()
        };
        assert_eq!(config.loop_delay(), MIN_LOOP_DELAY);
        assert_eq!(AutonomyConfig::default().loop_delay_ms, 50);
    }

    #[test]
    fn missing_reading_renders_as_na() {
        assert_eq!(format_reading(None), "N/A");
        assert_eq!(format_reading(Some(-3)), "-3");
    }
}
