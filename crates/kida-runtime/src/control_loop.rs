//! Autonomous control loop driver.
//!
//! [`ControlLoop::run`] steps one [`Policy`] at a fixed rate:
//!
//! 1. sample the [`SensorStore`],
//! 2. let the policy decide,
//! 3. send the command to the chassis if it changed,
//! 4. publish the status line.
//!
//! The loop ends when its [`CancelToken`] fires or the shared mode leaves
//! [`Mode::Autonomous`].  Whatever the exit path, exactly one forced `STOP`
//! is sent afterwards and `"<policy>: STOPPED"` is published.  A policy that
//! panics costs one tick: the robot is stopped, the policy is reset and the
//! loop carries on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use kida_hal::CommandDispatcher;
use kida_perception::SensorStore;
use kida_types::{Command, DeviceId, Mode};
use tracing::{error, info};

use crate::arbiter::SharedMode;
use crate::policy::{LOOP_DELAY, MIN_LOOP_DELAY, Policy};
use crate::status::StatusSink;

/// Longest single sleep between exit checks.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Pause after a policy panic before the next tick.
const PANIC_BACKOFF: Duration = Duration::from_millis(100);

// ────────────────────────────────────────────────────────────────────────────
// CancelToken
// ────────────────────────────────────────────────────────────────────────────

/// Shared one-way stop flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ────────────────────────────────────────────────────────────────────────────

/// Why [`ControlLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// The operator switched back to manual control.
    ModeChanged,
}

/// One autonomous run of a policy.
pub struct ControlLoop {
    policy: Box<dyn Policy>,
    store: Arc<SensorStore>,
    dispatcher: Arc<CommandDispatcher>,
    status: Arc<dyn StatusSink>,
    mode: SharedMode,
    cancel: CancelToken,
    loop_delay: Duration,
    device: DeviceId,
}

impl ControlLoop {
    pub fn new(
        policy: Box<dyn Policy>,
        store: Arc<SensorStore>,
        dispatcher: Arc<CommandDispatcher>,
        status: Arc<dyn StatusSink>,
        mode: SharedMode,
        cancel: CancelToken,
    ) -> Self {
        Self {
            policy,
            store,
            dispatcher,
            status,
            mode,
            cancel,
            loop_delay: LOOP_DELAY,
            device: DeviceId::chassis(),
        }
    }

    /// Pace ticks at `loop_delay`, floored at [`MIN_LOOP_DELAY`].
    pub fn with_loop_delay(mut self, loop_delay: Duration) -> Self {
        self.loop_delay = loop_delay.max(MIN_LOOP_DELAY);
        self
    }

    /// Run until cancelled or the mode leaves Autonomous.
    pub fn run(mut self) -> LoopExit {
        let name = self.policy.name();
        info!(policy = name, delay = ?self.loop_delay, "autonomous loop started");

        let exit = loop {
            if let Some(exit) = self.exit_reason() {
                break exit;
            }
            self.tick();
            if let Some(exit) = self.pause(self.loop_delay) {
                break exit;
            }
        };

        self.dispatcher.send(&self.device, &Command::Stop);
        self.status.publish(&format!("{name}: STOPPED"));
        info!(policy = name, reason = ?exit, "autonomous loop stopped safely");
        exit
    }

    fn tick(&mut self) {
        let sample = self.store.sample();
        let policy = &mut self.policy;
        let stepped = panic::catch_unwind(AssertUnwindSafe(|| policy.step(&sample, Instant::now())));

        match stepped {
            Ok(decision) => {
                self.dispatcher.send_if_changed(&self.device, &decision.command);
                self.status.publish(&decision.status);
            }
            Err(_) => {
                error!(policy = self.policy.name(), "policy step panicked, stopping robot");
                self.dispatcher.send(&self.device, &Command::Stop);
                self.policy.reset();
                // Let the next decision through even if it repeats the last one.
                self.dispatcher.reset_dedup();
                self.pause(PANIC_BACKOFF);
            }
        }
    }

    fn exit_reason(&self) -> Option<LoopExit> {
        if self.cancel.is_cancelled() {
            Some(LoopExit::Cancelled)
        } else if self.mode.get() != Mode::Autonomous {
            Some(LoopExit::ModeChanged)
        } else {
            None
        }
    }

    /// Sleep for `total`, waking early when the loop should exit.
    fn pause(&self, total: Duration) -> Option<LoopExit> {
        let deadline = Instant::now() + total;
        loop {
            if let Some(exit) = self.exit_reason() {
                return Some(exit);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AutonomyConfig, Decision, PolicyKind, build_policy};
    use crate::status::tests::RecordingSink;
    use kida_hal::{SimBoards, SimLog};
    use kida_types::{ParsedSensorSample, RawSensorReading, SensorChannel};

    struct Harness {
        store: Arc<SensorStore>,
        dispatcher: Arc<CommandDispatcher>,
        log: SimLog,
        sink: Arc<RecordingSink>,
        mode: SharedMode,
        cancel: CancelToken,
    }

    impl Harness {
        fn new() -> Self {
            let (dispatcher, log) = SimBoards::new().with_chassis().build();
            let mode = SharedMode::default();
            mode.set(Mode::Autonomous);
            Self {
                store: Arc::new(SensorStore::new()),
                dispatcher: Arc::new(dispatcher),
                log,
                sink: Arc::new(RecordingSink::default()),
                mode,
                cancel: CancelToken::new(),
            }
        }

        fn control_loop(&self, policy: Box<dyn Policy>) -> ControlLoop {
            ControlLoop::new(
                policy,
                Arc::clone(&self.store),
                Arc::clone(&self.dispatcher),
                self.sink.clone(),
                self.mode.clone(),
                self.cancel.clone(),
            )
            .with_loop_delay(Duration::from_millis(5))
        }

        fn wait_for_commands(&self, n: usize) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while self.log.commands_for(&DeviceId::chassis()).len() < n {
                assert!(Instant::now() < deadline, "loop never dispatched");
                thread::sleep(Duration::from_millis(2));
            }
        }
    }

    fn set_line(store: &SensorStore, l: i32, m: i32, r: i32) {
        store.set(SensorChannel::LineLeft, RawSensorReading::text(format!("LF_LEFT:{l}")));
        store.set(SensorChannel::LineMid, RawSensorReading::text(format!("LF_MID:{m}")));
        store.set(SensorChannel::LineRight, RawSensorReading::text(format!("LF_RIGHT:{r}")));
    }

    #[test]
    fn zero_loop_delay_is_floored() {
        let h = Harness::new();
        let control = h
            .control_loop(build_policy(PolicyKind::ObstacleAvoidance, &AutonomyConfig::default()))
            .with_loop_delay(Duration::ZERO);
        assert_eq!(control.loop_delay, MIN_LOOP_DELAY);

        let worker = thread::spawn(move || control.run());
        h.wait_for_commands(1);
        h.cancel.cancel();
        assert_eq!(worker.join().unwrap(), LoopExit::Cancelled);
        assert_eq!(h.log.commands_for(&DeviceId::chassis()), ["FORWARD", "STOP"]);
    }

    #[test]
    fn cancellation_sends_exactly_one_stop_for_every_policy() {
        for kind in PolicyKind::ALL {
            let h = Harness::new();
            match kind {
                PolicyKind::ObstacleAvoidance => {}
                PolicyKind::LineFollower => set_line(&h.store, 600, 600, 600),
                PolicyKind::PidLineFollower => set_line(&h.store, 100, 600, 100),
            }
            let control = h.control_loop(build_policy(kind, &AutonomyConfig::default()));
            let worker = thread::spawn(move || control.run());

            h.wait_for_commands(1);
            thread::sleep(Duration::from_millis(30));
            h.cancel.cancel();
            assert_eq!(worker.join().unwrap(), LoopExit::Cancelled, "{kind}");

            assert_eq!(h.log.commands_for(&DeviceId::chassis()), ["FORWARD", "STOP"], "{kind}");
            let lines = h.sink.lines();
            assert!(lines.last().unwrap().ends_with(": STOPPED"), "{kind}");
        }
    }

    #[test]
    fn leaving_autonomous_mode_stops_the_loop() {
        let h = Harness::new();
        let control = h.control_loop(build_policy(PolicyKind::ObstacleAvoidance, &AutonomyConfig::default()));
        let worker = thread::spawn(move || control.run());

        h.wait_for_commands(1);
        h.mode.set(Mode::Manual);
        assert_eq!(worker.join().unwrap(), LoopExit::ModeChanged);
        assert_eq!(h.log.count(&DeviceId::chassis(), "STOP"), 1);
        assert_eq!(h.sink.lines().last().unwrap(), "ObstacleAvoidance: STOPPED");
    }

    #[test]
    fn already_cancelled_loop_only_stops() {
        let h = Harness::new();
        h.cancel.cancel();
        let exit = h
            .control_loop(build_policy(PolicyKind::LineFollower, &AutonomyConfig::default()))
            .run();
        assert_eq!(exit, LoopExit::Cancelled);
        assert_eq!(h.log.commands_for(&DeviceId::chassis()), ["STOP"]);
        assert_eq!(h.sink.lines(), ["LineFollower: STOPPED"]);
    }

    #[test]
    fn decisions_follow_sensor_changes_without_repeats() {
        let h = Harness::new();
        let control = h.control_loop(build_policy(PolicyKind::ObstacleAvoidance, &AutonomyConfig::default()));
        let worker = thread::spawn(move || control.run());

        h.wait_for_commands(1);
        h.store.set(SensorChannel::Laser, RawSensorReading::text("LASER:30"));
        h.store.set(SensorChannel::Ultrasonic1, RawSensorReading::text("ULTRASONIC1:10"));
        h.wait_for_commands(2);
        thread::sleep(Duration::from_millis(30));
        h.cancel.cancel();
        worker.join().unwrap();

        assert_eq!(h.log.commands_for(&DeviceId::chassis()), ["FORWARD", "LEFT", "STOP"]);
        assert!(h.sink.lines().iter().any(|l| l.starts_with("ObstacleAvoidance: LEFT | Sensors: laser=30")));
    }

    #[test]
    fn transport_failure_does_not_end_the_loop() {
        let h = Harness::new();
        let (dispatcher, log) = {
            let log = SimLog::default();
            let mut dispatcher = CommandDispatcher::new();
            let transport = kida_hal::SimTransport::new(DeviceId::chassis(), log.clone());
            transport.fault_switch().set_failing(true);
            dispatcher.register(transport);
            (Arc::new(dispatcher), log)
        };
        let control = ControlLoop::new(
            build_policy(PolicyKind::ObstacleAvoidance, &AutonomyConfig::default()),
            Arc::clone(&h.store),
            dispatcher,
            h.sink.clone(),
            h.mode.clone(),
            h.cancel.clone(),
        )
        .with_loop_delay(Duration::from_millis(5));
        let worker = thread::spawn(move || control.run());

        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());
        h.cancel.cancel();
        assert_eq!(worker.join().unwrap(), LoopExit::Cancelled);
        assert!(log.is_empty());
    }

    struct Flaky {
        calls: u32,
    }

    impl Policy for Flaky {
        fn name(&self) -> &'static str {
            "Flaky"
        }

        fn step(&mut self, _sample: &ParsedSensorSample, _now: Instant) -> Decision {
            self.calls += 1;
            if self.calls == 1 {
                panic!("sensor math blew up");
            }
            Decision {
                command: Command::Forward,
                status: "Flaky: FORWARD".to_string(),
            }
        }
    }

    #[test]
    fn panicking_policy_stops_the_robot_and_recovers() {
        let h = Harness::new();
        let control = h.control_loop(Box::new(Flaky { calls: 0 }));
        let worker = thread::spawn(move || control.run());

        h.wait_for_commands(2);
        h.cancel.cancel();
        worker.join().unwrap();

        let commands = h.log.commands_for(&DeviceId::chassis());
        assert_eq!(commands[..2], ["STOP", "FORWARD"]);
        assert_eq!(commands.last().map(String::as_str), Some("STOP"));
    }
}
