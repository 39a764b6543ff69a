//! Threshold line-following policy and line-search recovery.
//!
//! Three downward-facing reflectance sensors read higher over the line.  A
//! sensor is "on the line" when its reading exceeds the configured
//! threshold; the on/off pattern maps to a [`LinePosition`] with a fixed
//! confidence, and the position maps to a steering command.
//!
//! When no sensor sees the line the policy hands over to [`LineSearch`],
//! which sweeps alternately right and left until the line is reacquired,
//! the search times out, or the turn budget is spent.  After that it holds
//! `STOP` until a confident reading arrives.

use std::fmt;
use std::time::{Duration, Instant};

use kida_types::{Command, ParsedSensorSample};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::policy::{Decision, Policy};

/// Reading above which a reflectance sensor is over the line.
pub const LINE_THRESHOLD: i32 = 500;
/// How long a lost line is searched for before stopping.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(3);
/// Search turns allowed before stopping.
pub const MAX_SEARCH_TURNS: u32 = 6;
/// Confidence strictly above which a reading counts as a reacquired line.
pub const RECOVERY_CONFIDENCE: u8 = 70;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Line-following tunables shared by the threshold and PID policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub line_threshold: i32,
    pub search_timeout_secs: f64,
    pub max_search_turns: u32,
    pub recovery_confidence: u8,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            line_threshold: LINE_THRESHOLD,
            search_timeout_secs: SEARCH_TIMEOUT.as_secs_f64(),
            max_search_turns: MAX_SEARCH_TURNS,
            recovery_confidence: RECOVERY_CONFIDENCE,
        }
    }
}

impl LineConfig {
    /// Search timeout; negative or non-finite values collapse to zero.
    pub fn search_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.search_timeout_secs).unwrap_or(Duration::ZERO)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Position detection
// ────────────────────────────────────────────────────────────────────────────

/// Where the line is relative to the sensor bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinePosition {
    CenterWide,
    SlightLeft,
    SlightRight,
    Center,
    Left,
    Right,
    Gap,
    Lost,
}

impl LinePosition {
    pub fn as_str(self) -> &'static str {
        match self {
            LinePosition::CenterWide => "CENTER_WIDE",
            LinePosition::SlightLeft => "SLIGHT_LEFT",
            LinePosition::SlightRight => "SLIGHT_RIGHT",
            LinePosition::Center => "CENTER",
            LinePosition::Left => "LEFT",
            LinePosition::Right => "RIGHT",
            LinePosition::Gap => "GAP",
            LinePosition::Lost => "LOST",
        }
    }
}

impl fmt::Display for LinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify three reflectance readings.  A missing reading is "off".
pub fn detect_line_position(
    left: Option<i32>,
    middle: Option<i32>,
    right: Option<i32>,
    threshold: i32,
) -> (LinePosition, u8) {
    let on = |v: Option<i32>| v.is_some_and(|v| v > threshold);
    let (l, m, r) = (on(left), on(middle), on(right));

    match (l, m, r) {
        (true, true, true) => (LinePosition::CenterWide, 95),
        (true, true, false) => (LinePosition::SlightLeft, 85),
        (false, true, true) => (LinePosition::SlightRight, 85),
        (false, true, false) => (LinePosition::Center, 90),
        (true, false, false) => (LinePosition::Left, 80),
        (false, false, true) => (LinePosition::Right, 80),
        (true, false, true) => (LinePosition::Gap, 70),
        (false, false, false) => (LinePosition::Lost, 0),
    }
}

/// Steering command for a detected position; `None` for [`LinePosition::Lost`].
pub fn position_command(position: LinePosition) -> Option<Command> {
    match position {
        LinePosition::Center | LinePosition::CenterWide | LinePosition::Gap => Some(Command::Forward),
        LinePosition::SlightLeft => Some(Command::SlightLeft),
        LinePosition::SlightRight => Some(Command::SlightRight),
        LinePosition::Left => Some(Command::Left),
        LinePosition::Right => Some(Command::Right),
        LinePosition::Lost => None,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Line search
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Left,
    Right,
}

impl SearchDirection {
    fn flipped(self) -> Self {
        match self {
            SearchDirection::Left => SearchDirection::Right,
            SearchDirection::Right => SearchDirection::Left,
        }
    }

    fn command(self) -> Command {
        match self {
            SearchDirection::Left => Command::Left,
            SearchDirection::Right => Command::Right,
        }
    }
}

/// Phase of the recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// The line is (or was last) confidently seen.
    Following,
    /// Sweeping to find the line again.
    Searching,
    /// Gave up; holding `STOP` until the line is reacquired.
    Stopped,
}

/// Lost-line tracker owned by a line-following policy.
#[derive(Debug, Clone)]
pub struct LineSearch {
    timeout: Duration,
    max_turns: u32,
    lost_since: Option<Instant>,
    attempts: u32,
    direction: SearchDirection,
    stopped: bool,
    last_position: LinePosition,
}

impl LineSearch {
    pub fn new(timeout: Duration, max_turns: u32) -> Self {
        Self {
            timeout,
            max_turns,
            lost_since: None,
            attempts: 0,
            direction: SearchDirection::Right,
            stopped: false,
            last_position: LinePosition::Center,
        }
    }

    pub fn from_config(config: &LineConfig) -> Self {
        Self::new(config.search_timeout(), config.max_search_turns)
    }

    /// One search tick while the line is lost.
    ///
    /// The first call starts the search; the budget is checked before every
    /// turn, so the call that finds it exhausted already returns `STOP`.
    pub fn step(&mut self, now: Instant) -> Command {
        let since = match self.lost_since {
            Some(since) => since,
            None => {
                warn!(last_seen = %self.last_position, "line lost, starting search");
                self.lost_since = Some(now);
                now
            }
        };

        let elapsed = now.saturating_duration_since(since);
        if elapsed > self.timeout || self.attempts >= self.max_turns {
            if !self.stopped {
                error!(
                    elapsed_s = elapsed.as_secs_f32(),
                    attempts = self.attempts,
                    "line search exhausted, stopping"
                );
                self.stopped = true;
            }
            return Command::Stop;
        }

        let command = self.direction.command();
        self.direction = self.direction.flipped();
        self.attempts += 1;
        info!(command = %command, attempt = self.attempts, "searching for line");
        command
    }

    /// Record a confident sighting at `position`, ending any search.
    pub fn reacquired(&mut self, position: LinePosition) {
        self.last_position = position;
        self.reset();
    }

    /// Clear the search state without touching the last seen position.
    pub fn reset(&mut self) {
        if self.lost_since.is_some() {
            info!("line reacquired");
        }
        self.lost_since = None;
        self.attempts = 0;
        self.direction = SearchDirection::Right;
        self.stopped = false;
    }

    pub fn state(&self) -> RecoveryState {
        match (self.lost_since, self.stopped) {
            (None, _) => RecoveryState::Following,
            (Some(_), false) => RecoveryState::Searching,
            (Some(_), true) => RecoveryState::Stopped,
        }
    }

    /// Time since the line was lost, if it is.
    pub fn lost_for(&self, now: Instant) -> Option<Duration> {
        self.lost_since.map(|since| now.saturating_duration_since(since))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Last position seen with confidence above the recovery bar.
    pub fn last_position(&self) -> LinePosition {
        self.last_position
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Threshold policy
// ────────────────────────────────────────────────────────────────────────────

/// Line follower driven by the position table.
#[derive(Debug, Clone)]
pub struct ThresholdLineFollower {
    config: LineConfig,
    search: LineSearch,
}

impl ThresholdLineFollower {
    pub fn new(config: LineConfig) -> Self {
        let search = LineSearch::from_config(&config);
        Self { config, search }
    }

    pub fn search(&self) -> &LineSearch {
        &self.search
    }
}

impl Default for ThresholdLineFollower {
    fn default() -> Self {
        Self::new(LineConfig::default())
    }
}

impl Policy for ThresholdLineFollower {
    fn name(&self) -> &'static str {
        "LineFollower"
    }

    fn step(&mut self, sample: &ParsedSensorSample, now: Instant) -> Decision {
        let (left, middle, right) = (sample.line_left, sample.line_mid, sample.line_right);
        let (position, confidence) =
            detect_line_position(left, middle, right, self.config.line_threshold);

        if confidence > self.config.recovery_confidence {
            self.search.reacquired(position);
        }
        let command = match position_command(position) {
            Some(command) => command,
            None => self.search.step(now),
        };

        let sensors: Vec<String> = [("L", left), ("M", middle), ("R", right)]
            .into_iter()
            .filter_map(|(label, value)| value.map(|v| format!("{label}={v}")))
            .collect();
        let mut status = format!(
            "{}: {command} | Position: {position}({confidence}%) | Sensors: {}",
            self.name(),
            sensors.join(", ")
        );
        if let Some(lost) = self.search.lost_for(now) {
            status.push_str(&format!(" | Searching: {:.1}s", lost.as_secs_f64()));
        }

        Decision { command, status }
    }

    fn reset(&mut self) {
        self.search.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(l: i32, m: i32, r: i32) -> ParsedSensorSample {
        ParsedSensorSample {
            line_left: Some(l),
            line_mid: Some(m),
            line_right: Some(r),
            ..Default::default()
        }
    }

    #[test]
    fn position_table() {
        let t = LINE_THRESHOLD;
        let cases = [
            ((600, 600, 600), LinePosition::CenterWide, 95),
            ((600, 600, 100), LinePosition::SlightLeft, 85),
            ((100, 600, 600), LinePosition::SlightRight, 85),
            ((100, 600, 100), LinePosition::Center, 90),
            ((600, 100, 100), LinePosition::Left, 80),
            ((100, 100, 600), LinePosition::Right, 80),
            ((600, 100, 600), LinePosition::Gap, 70),
            ((100, 100, 100), LinePosition::Lost, 0),
        ];
        for ((l, m, r), position, confidence) in cases {
            assert_eq!(
                detect_line_position(Some(l), Some(m), Some(r), t),
                (position, confidence),
                "({l}, {m}, {r})"
            );
        }
    }

    #[test]
    fn threshold_is_exclusive_and_missing_is_off() {
        assert_eq!(
            detect_line_position(Some(500), Some(501), None, LINE_THRESHOLD),
            (LinePosition::Center, 90)
        );
        assert_eq!(
            detect_line_position(None, None, None, LINE_THRESHOLD),
            (LinePosition::Lost, 0)
        );
    }

    #[test]
    fn command_table() {
        assert_eq!(position_command(LinePosition::Gap), Some(Command::Forward));
        assert_eq!(position_command(LinePosition::SlightLeft), Some(Command::SlightLeft));
        assert_eq!(position_command(LinePosition::Right), Some(Command::Right));
        assert_eq!(position_command(LinePosition::Lost), None);
    }

    #[test]
    fn wide_line_drives_forward() {
        let mut policy = ThresholdLineFollower::default();
        let decision = policy.step(&line(600, 600, 600), Instant::now());
        assert_eq!(decision.command, Command::Forward);
        assert_eq!(
            decision.status,
            "LineFollower: FORWARD | Position: CENTER_WIDE(95%) | Sensors: L=600, M=600, R=600"
        );
    }

    #[test]
    fn lost_line_sweeps_then_stops_after_timeout() {
        let mut policy = ThresholdLineFollower::default();
        let t0 = Instant::now();
        let lost = line(0, 0, 0);
        let at = |secs: f64| t0 + Duration::from_secs_f64(secs);

        let commands: Vec<Command> = [0.0, 1.1, 2.2, 3.3]
            .into_iter()
            .map(|s| policy.step(&lost, at(s)).command)
            .collect();
        assert_eq!(
            commands,
            [Command::Right, Command::Left, Command::Right, Command::Stop]
        );
        assert_eq!(policy.search().state(), RecoveryState::Stopped);

        // Stays stopped while the line remains lost.
        let held = policy.step(&lost, at(4.0));
        assert_eq!(held.command, Command::Stop);
        assert!(held.status.ends_with("| Searching: 4.0s"), "{}", held.status);
    }

    #[test]
    fn turn_budget_stops_before_timeout() {
        let mut search = LineSearch::new(SEARCH_TIMEOUT, MAX_SEARCH_TURNS);
        let t0 = Instant::now();
        let commands: Vec<Command> = (0..7)
            .map(|i| search.step(t0 + Duration::from_millis(i * 50)))
            .collect();
        assert_eq!(
            commands,
            [
                Command::Right,
                Command::Left,
                Command::Right,
                Command::Left,
                Command::Right,
                Command::Left,
                Command::Stop,
            ]
        );
        assert_eq!(search.attempts(), 6);
    }

    #[test]
    fn confident_sighting_resets_the_search() {
        let mut policy = ThresholdLineFollower::default();
        let t0 = Instant::now();
        policy.step(&line(0, 0, 0), t0);
        policy.step(&line(0, 0, 0), t0 + Duration::from_millis(50));
        assert_eq!(policy.search().state(), RecoveryState::Searching);

        let found = policy.step(&line(100, 100, 900), t0 + Duration::from_millis(100));
        assert_eq!(found.command, Command::Right);
        assert_eq!(policy.search().state(), RecoveryState::Following);
        assert_eq!(policy.search().last_position(), LinePosition::Right);
        assert!(!found.status.contains("Searching"));

        // A fresh loss starts over from the right.
        let relost = policy.step(&line(0, 0, 0), t0 + Duration::from_secs(10));
        assert_eq!(relost.command, Command::Right);
    }

    #[test]
    fn gap_does_not_end_the_search() {
        let mut policy = ThresholdLineFollower::default();
        let t0 = Instant::now();
        policy.step(&line(0, 0, 0), t0);
        let gap = policy.step(&line(600, 0, 600), t0 + Duration::from_millis(50));
        assert_eq!(gap.command, Command::Forward);
        assert_eq!(policy.search().state(), RecoveryState::Searching);
        assert!(gap.status.contains("Position: GAP(70%)"));
    }

    #[test]
    fn status_omits_missing_sensors() {
        let mut policy = ThresholdLineFollower::default();
        let sample = ParsedSensorSample {
            line_mid: Some(700),
            ..Default::default()
        };
        let decision = policy.step(&sample, Instant::now());
        assert_eq!(
            decision.status,
            "LineFollower: FORWARD | Position: CENTER(90%) | Sensors: M=700"
        );
    }
}
