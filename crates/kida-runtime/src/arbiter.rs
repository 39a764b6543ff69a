//! Mode arbiter: who is allowed to drive.
//!
//! [`ModeArbiter`] owns the shared [`Mode`] and the autonomous worker
//! thread.  Switching to autonomous notifies the chassis and spawns a
//! [`ControlLoop`] unless one is already alive.  Switching back to manual
//! waits for the loop to observe the change, stop the robot and exit before
//! notifying the chassis, so no autonomous command can land after the
//! operator has taken over.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use kida_hal::CommandDispatcher;
use kida_perception::SensorStore;
use kida_types::{Command, DeviceId, Mode};
use tracing::{error, info, warn};

use crate::control_loop::{CancelToken, ControlLoop, LoopExit};
use crate::policy::{AutonomyConfig, PolicyKind, build_policy};
use crate::status::StatusSink;

/// Chassis notification sent when manual control takes over.
pub const KEYBOARD_CONTROL: &str = "KEYBOARDCONTROL";
/// Chassis notification sent when autonomous control takes over.
pub const SELF_CONTROL: &str = "SELFCONTROL";

// ────────────────────────────────────────────────────────────────────────────
// SharedMode
// ────────────────────────────────────────────────────────────────────────────

/// Atomic [`Mode`] cell shared by the arbiter, the control loop and the
/// manual input layer.  Only the arbiter writes it outside tests.
#[derive(Debug, Clone, Default)]
pub struct SharedMode(Arc<AtomicU8>);

impl SharedMode {
    pub fn get(&self) -> Mode {
        match self.0.load(Ordering::SeqCst) {
            1 => Mode::Autonomous,
            _ => Mode::Manual,
        }
    }

    pub fn set(&self, mode: Mode) {
        let raw = match mode {
            Mode::Manual => 0,
            Mode::Autonomous => 1,
        };
        self.0.store(raw, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ModeArbiter
// ────────────────────────────────────────────────────────────────────────────

struct Worker {
    handle: JoinHandle<LoopExit>,
    cancel: CancelToken,
    policy: PolicyKind,
}

impl Worker {
    fn join(self) {
        match self.handle.join() {
            Ok(exit) => info!(policy = %self.policy, reason = ?exit, "autonomous worker joined"),
            Err(_) => error!(policy = %self.policy, "autonomous worker panicked"),
        }
    }
}

/// Single authority over the operating mode.  Share it as `Arc<ModeArbiter>`.
pub struct ModeArbiter {
    mode: SharedMode,
    store: Arc<SensorStore>,
    dispatcher: Arc<CommandDispatcher>,
    status: Arc<dyn StatusSink>,
    config: Mutex<AutonomyConfig>,
    worker: Mutex<Option<Worker>>,
    chassis: DeviceId,
}

impl ModeArbiter {
    /// Start in [`Mode::Manual`] with no worker.
    pub fn new(
        store: Arc<SensorStore>,
        dispatcher: Arc<CommandDispatcher>,
        status: Arc<dyn StatusSink>,
        config: AutonomyConfig,
    ) -> Self {
        Self {
            mode: SharedMode::default(),
            store,
            dispatcher,
            status,
            config: Mutex::new(config),
            worker: Mutex::new(None),
            chassis: DeviceId::chassis(),
        }
    }

    /// Handle for readers of the mode, such as the manual driver.
    pub fn shared_mode(&self) -> SharedMode {
        self.mode.clone()
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Policy the next autonomous run will use.
    pub fn policy(&self) -> PolicyKind {
        self.config_guard().policy
    }

    /// Select the policy for the next autonomous run.  A running loop keeps
    /// its current policy.
    pub fn set_policy(&self, kind: PolicyKind) {
        self.config_guard().policy = kind;
        if self.is_autonomous_running() {
            info!(policy = %kind, "policy selected, applies to the next autonomous run");
        } else {
            info!(policy = %kind, "policy selected");
        }
    }

    /// `true` while a control-loop thread is alive.
    pub fn is_autonomous_running(&self) -> bool {
        self.worker_guard()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Hand control to the operator.
    ///
    /// Blocks until a running loop has sent its final `STOP`, which takes at
    /// most one loop delay, then notifies the chassis.
    pub fn enable_manual(&self) {
        let mut worker = self.worker_guard();
        self.mode.set(Mode::Manual);
        if let Some(w) = worker.take() {
            w.join();
        }
        self.dispatcher.send(&self.chassis, &Command::device(KEYBOARD_CONTROL));
        info!("keyboard control enabled");
    }

    /// Hand control to the selected policy.
    ///
    /// Returns `true` when a new control-loop thread was spawned; `false`
    /// when one is already running or the thread could not be created.
    pub fn enable_autonomous(&self) -> bool {
        let mut worker = self.worker_guard();
        self.dispatcher.send(&self.chassis, &Command::device(SELF_CONTROL));
        self.mode.set(Mode::Autonomous);

        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            info!("autonomous mode already running");
            return false;
        }
        if let Some(finished) = worker.take() {
            finished.join();
        }

        let config = self.config_guard().clone();
        let cancel = CancelToken::new();
        let control = ControlLoop::new(
            build_policy(config.policy, &config),
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.status),
            self.mode.clone(),
            cancel.clone(),
        )
        .with_loop_delay(config.loop_delay());

        match thread::Builder::new()
            .name("autonomy".into())
            .spawn(move || control.run())
        {
            Ok(handle) => {
                info!(policy = %config.policy, "autonomous control enabled");
                *worker = Some(Worker {
                    handle,
                    cancel,
                    policy: config.policy,
                });
                true
            }
            Err(e) => {
                error!(error = %e, "failed to spawn autonomous worker");
                self.mode.set(Mode::Manual);
                false
            }
        }
    }

    /// Stop everything for process exit.
    ///
    /// A running loop is cancelled and joined, which sends its final `STOP`.
    /// Without one, a `STOP` is sent directly so a manually driven robot also
    /// halts.
    pub fn shutdown(&self) {
        let mut worker = self.worker_guard();
        match worker.take() {
            Some(w) => {
                w.cancel.cancel();
                w.join();
            }
            None => {
                if !self.dispatcher.send(&self.chassis, &Command::Stop) {
                    warn!("final STOP could not be delivered");
                }
            }
        }
        self.mode.set(Mode::Manual);
        info!("control core shut down");
    }

    fn worker_guard(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn config_guard(&self) -> MutexGuard<'_, AutonomyConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ModeArbiter {
    fn drop(&mut self) {
        if let Some(w) = self.worker_guard().take() {
            w.cancel.cancel();
            w.join();
        }
    }
}
