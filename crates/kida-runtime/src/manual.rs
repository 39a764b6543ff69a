//! Manual input handling.
//!
//! Keyboard, gamepad, remote-shell and voice inputs all end up in one
//! [`ManualDriver`].  It resolves held keys into a single motion, writes to
//! the chassis only when that motion changes, and mirrors moving/stopped on
//! the accessory lights.  Every input is ignored while the robot is under
//! autonomous control.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kida_hal::CommandDispatcher;
use kida_types::{Command, DeviceId, Mode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arbiter::SharedMode;

/// Stick deflection below which a gamepad axis reads as centred.
pub const GAMEPAD_DEADZONE: f32 = 0.2;

// ────────────────────────────────────────────────────────────────────────────
// Keys and text
// ────────────────────────────────────────────────────────────────────────────

/// A held direction key.  Declaration order is resolution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MotionKey {
    Forward,
    Backward,
    Left,
    Right,
}

impl MotionKey {
    pub fn command(self) -> Command {
        match self {
            MotionKey::Forward => Command::Forward,
            MotionKey::Backward => Command::Backward,
            MotionKey::Left => Command::Left,
            MotionKey::Right => Command::Right,
        }
    }

    /// `w`/`a`/`s`/`d`, case-insensitive.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'w' => Some(MotionKey::Forward),
            's' => Some(MotionKey::Backward),
            'a' => Some(MotionKey::Left),
            'd' => Some(MotionKey::Right),
            _ => None,
        }
    }
}

/// Motion for a gamepad stick position (`y` negative is pushed forward).
pub fn gamepad_motion(axis_x: f32, axis_y: f32) -> Command {
    if axis_y < -GAMEPAD_DEADZONE {
        Command::Forward
    } else if axis_y > GAMEPAD_DEADZONE {
        Command::Backward
    } else if axis_x < -GAMEPAD_DEADZONE {
        Command::Left
    } else if axis_x > GAMEPAD_DEADZONE {
        Command::Right
    } else {
        Command::Stop
    }
}

/// A recognised operator word or phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    Drive(Command),
    Quit,
}

/// Remote-shell vocabulary.  Unknown words yield `None`.
pub fn parse_text_command(input: &str) -> Option<TextCommand> {
    let word = input.trim().to_ascii_lowercase();
    let command = match word.as_str() {
        "w" | "up" | "forward" => Command::Forward,
        "s" | "down" | "back" | "backward" => Command::Backward,
        "a" | "left" => Command::Left,
        "d" | "right" => Command::Right,
        "x" | "stop" => Command::Stop,
        "q" | "exit" | "quit" => return Some(TextCommand::Quit),
        _ => return None,
    };
    Some(TextCommand::Drive(command))
}

/// Scan a transcribed phrase for a movement keyword.
///
/// Keywords are tried in a fixed order, so "go back and stop" means
/// backward, not stop.
pub fn interpret_phrase(phrase: &str) -> Option<TextCommand> {
    const KEYWORDS: [(&str, Option<Command>); 7] = [
        ("forward", Some(Command::Forward)),
        ("backward", Some(Command::Backward)),
        ("back", Some(Command::Backward)),
        ("stop", Some(Command::Stop)),
        ("left", Some(Command::Left)),
        ("right", Some(Command::Right)),
        ("exit", None),
    ];
    let phrase = phrase.to_lowercase();
    KEYWORDS
        .into_iter()
        .find(|(keyword, _)| phrase.contains(keyword))
        .map(|(_, command)| command.map_or(TextCommand::Quit, TextCommand::Drive))
}

// ────────────────────────────────────────────────────────────────────────────
// Speed
// ────────────────────────────────────────────────────────────────────────────

/// Motor speed stepping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub default_speed: u16,
    pub step: u16,
    pub min_speed: u16,
    pub max_speed: u16,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            default_speed: 200,
            step: 50,
            min_speed: 100,
            max_speed: 255,
        }
    }
}

/// Current motor speed; stepping past the maximum wraps to the minimum.
#[derive(Debug, Clone)]
pub struct SpeedControl {
    config: SpeedConfig,
    speed: u16,
}

impl SpeedControl {
    pub fn new(config: SpeedConfig) -> Self {
        Self {
            speed: config.default_speed,
            config,
        }
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    /// Step up and return the new speed.
    pub fn increase(&mut self) -> u16 {
        self.speed = self.speed.saturating_add(self.config.step);
        if self.speed > self.config.max_speed {
            self.speed = self.config.min_speed;
        }
        self.speed
    }

    /// Chassis command carrying the current speed.
    pub fn command(&self) -> Command {
        Command::device(format!("SPEED:{}", self.speed))
    }
}

impl Default for SpeedControl {
    fn default() -> Self {
        Self::new(SpeedConfig::default())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ManualDriver
// ────────────────────────────────────────────────────────────────────────────

/// Accessory light commands for a moving robot.
pub const LIGHTS_MOVING: [&str; 2] = ["LIGHT_FRONT_ON", "LIGHT_BACK_OFF"];
/// Accessory light commands for a stopped robot.
pub const LIGHTS_STOPPED: [&str; 2] = ["LIGHT_FRONT_OFF", "LIGHT_BACK_ON"];

#[derive(Debug, Default)]
struct ManualState {
    held: BTreeSet<MotionKey>,
    /// Motion last sent; `None` when stopped or never driven.
    current: Option<Command>,
    /// Whether the lights were last set for moving.
    lights_moving: Option<bool>,
}

/// The one funnel for operator motion commands.
pub struct ManualDriver {
    dispatcher: Arc<CommandDispatcher>,
    mode: SharedMode,
    state: Mutex<ManualState>,
    speed: Mutex<SpeedControl>,
    chassis: DeviceId,
    accessory: DeviceId,
}

impl ManualDriver {
    pub fn new(dispatcher: Arc<CommandDispatcher>, mode: SharedMode, speed: SpeedConfig) -> Self {
        Self {
            dispatcher,
            mode,
            state: Mutex::new(ManualState::default()),
            speed: Mutex::new(SpeedControl::new(speed)),
            chassis: DeviceId::chassis(),
            accessory: DeviceId::accessory(),
        }
    }

    /// A direction key went down.  Returns `true` when a command was sent.
    pub fn press(&self, key: MotionKey) -> bool {
        let Some(mut state) = self.manual_state() else {
            return false;
        };
        state.held.insert(key);
        self.apply_held(&mut state)
    }

    /// A direction key came up.  Releasing the last key stops the robot once.
    pub fn release(&self, key: MotionKey) -> bool {
        let Some(mut state) = self.manual_state() else {
            return false;
        };
        state.held.remove(&key);
        self.apply_held(&mut state)
    }

    /// Drive with an absolute motion (gamepad stick, text word), sending only
    /// on change.  Any held keys are forgotten.  Device commands are refused.
    pub fn drive(&self, command: Command) -> bool {
        if !command.is_motion() {
            warn!(%command, "not a motion command; ignored");
            return false;
        }
        let Some(mut state) = self.manual_state() else {
            return false;
        };
        state.held.clear();
        let target = (command != Command::Stop).then_some(command);
        self.transition(&mut state, target)
    }

    /// Release everything and stop.
    pub fn stop(&self) -> bool {
        self.drive(Command::Stop)
    }

    /// Motion last sent by the driver.
    pub fn current(&self) -> Option<Command> {
        self.state_guard().current.clone()
    }

    /// Forget held keys and the last motion, e.g. after autonomous control
    /// has driven the robot in between.
    pub fn reset(&self) {
        *self.state_guard() = ManualState::default();
    }

    /// Step the motor speed and send it to the chassis.  Allowed in any mode.
    pub fn increase_speed(&self) -> u16 {
        let mut speed = self.speed.lock().unwrap_or_else(PoisonError::into_inner);
        let value = speed.increase();
        info!(speed = value, "motor speed changed");
        self.dispatcher.send(&self.chassis, &speed.command());
        value
    }

    pub fn speed(&self) -> u16 {
        self.speed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .speed()
    }

    /// State guard, or `None` (after clearing the state) outside manual mode.
    fn manual_state(&self) -> Option<MutexGuard<'_, ManualState>> {
        let mut state = self.state_guard();
        if self.mode.get() != Mode::Manual {
            debug!("manual input ignored in autonomous mode");
            *state = ManualState::default();
            return None;
        }
        Some(state)
    }

    fn apply_held(&self, state: &mut ManualState) -> bool {
        let target = state.held.first().map(|key| key.command());
        self.transition(state, target)
    }

    fn transition(&self, state: &mut ManualState, target: Option<Command>) -> bool {
        if state.current == target {
            return false;
        }
        let command = target.clone().unwrap_or(Command::Stop);
        // Nothing was moving, so there is nothing to stop.
        if target.is_none() && state.current.is_none() {
            return false;
        }
        let sent = self.dispatcher.send(&self.chassis, &command);
        if sent {
            state.current = target;
            self.set_lights(state, command != Command::Stop);
        }
        sent
    }

    fn set_lights(&self, state: &mut ManualState, moving: bool) {
        if state.lights_moving == Some(moving) || !self.dispatcher.is_registered(&self.accessory) {
            return;
        }
        let lights = if moving { LIGHTS_MOVING } else { LIGHTS_STOPPED };
        for light in lights {
            self.dispatcher.send(&self.accessory, &Command::device(light));
        }
        state.lights_moving = Some(moving);
    }

    fn state_guard(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
