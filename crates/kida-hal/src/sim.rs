//! In-process simulated boards for tests and hardware-free runs.
//!
//! [`SimBoards`] builds a [`CommandDispatcher`] pre-populated with
//! [`SimTransport`]s that record every command in a shared [`SimLog`].  This
//! lets the full control stack run headless.
//!
//! # Example
//!
//! ```rust
//! use kida_hal::sim::SimBoards;
//! use kida_types::{Command, DeviceId};
//!
//! let (dispatcher, log) = SimBoards::new().with_chassis().build();
//! dispatcher.send(&DeviceId::chassis(), &Command::Forward);
//! assert_eq!(log.commands_for(&DeviceId::chassis()), ["FORWARD"]);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kida_types::{DeviceId, TransportError};

use crate::dispatcher::CommandDispatcher;
use crate::transport::MotionTransport;

// ────────────────────────────────────────────────────────────────────────────
// Command log
// ────────────────────────────────────────────────────────────────────────────

/// Shared, ordered record of every command written to simulated boards.
#[derive(Clone, Default)]
pub struct SimLog {
    entries: Arc<Mutex<Vec<(DeviceId, String)>>>,
}

impl SimLog {
    /// Every `(device, command)` pair, in write order.
    pub fn entries(&self) -> Vec<(DeviceId, String)> {
        self.lock().clone()
    }

    /// Commands written to `device`, in write order.
    pub fn commands_for(&self, device: &DeviceId) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(id, _)| id == device)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    /// Number of times `command` was written to `device`.
    pub fn count(&self, device: &DeviceId, command: &str) -> usize {
        self.lock()
            .iter()
            .filter(|(id, cmd)| id == device && cmd == command)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn record(&self, device: &DeviceId, command: &str) {
        self.lock().push((device.clone(), command.to_string()));
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(DeviceId, String)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated transport
// ────────────────────────────────────────────────────────────────────────────

/// Toggle that makes a [`SimTransport`] reject writes, simulating an
/// unplugged board.
#[derive(Clone, Default)]
pub struct FaultSwitch(Arc<AtomicBool>);

impl FaultSwitch {
    pub fn set_failing(&self, failing: bool) {
        self.0.store(failing, Ordering::SeqCst);
    }

    pub fn is_failing(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A simulated board that appends every successful write to a [`SimLog`].
pub struct SimTransport {
    id: DeviceId,
    log: SimLog,
    faults: FaultSwitch,
}

impl SimTransport {
    /// Create a simulated board writing into `log`.
    pub fn new(id: DeviceId, log: SimLog) -> Box<Self> {
        Box::new(Self {
            id,
            log,
            faults: FaultSwitch::default(),
        })
    }

    /// Handle for injecting write failures after the transport is registered.
    pub fn fault_switch(&self) -> FaultSwitch {
        self.faults.clone()
    }
}

impl MotionTransport for SimTransport {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        if self.faults.is_failing() {
            return Err(TransportError::NotConnected(self.id.to_string()));
        }
        self.log.record(&self.id, command);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimBoards builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a [`CommandDispatcher`] backed entirely by simulated boards
/// that share one [`SimLog`].
#[derive(Default)]
pub struct SimBoards {
    log: SimLog,
    devices: Vec<DeviceId>,
}

impl SimBoards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the simulated chassis board (`dev00`).
    pub fn with_chassis(self) -> Self {
        self.with_device(DeviceId::chassis())
    }

    /// Add the simulated accessory board (`dev01`).
    pub fn with_accessory(self) -> Self {
        self.with_device(DeviceId::accessory())
    }

    /// Add a simulated board with an arbitrary identifier.
    pub fn with_device(mut self, id: DeviceId) -> Self {
        self.devices.push(id);
        self
    }

    /// Consume the builder, returning the dispatcher and the shared log.
    pub fn build(self) -> (CommandDispatcher, SimLog) {
        let mut dispatcher = CommandDispatcher::new();
        for id in self.devices {
            dispatcher.register(SimTransport::new(id, self.log.clone()));
        }
        (dispatcher, self.log)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kida_types::Command;

    #[test]
    fn sim_transport_records_commands() {
        let log = SimLog::default();
        let mut transport = SimTransport::new(DeviceId::chassis(), log.clone());
        transport.send("FORWARD").unwrap();
        transport.send("STOP").unwrap();
        assert_eq!(log.commands_for(&DeviceId::chassis()), ["FORWARD", "STOP"]);
    }

    #[test]
    fn fault_switch_rejects_writes() {
        let log = SimLog::default();
        let mut transport = SimTransport::new(DeviceId::chassis(), log.clone());
        transport.fault_switch().set_failing(true);
        assert_eq!(
            transport.send("FORWARD"),
            Err(TransportError::NotConnected("dev00".to_string()))
        );
        assert!(log.is_empty());
    }

    #[test]
    fn both_boards_share_one_log() {
        let (dispatcher, log) = SimBoards::new().with_chassis().with_accessory().build();
        dispatcher.send(&DeviceId::chassis(), &Command::Forward);
        dispatcher.send(&DeviceId::accessory(), &Command::device("LIGHT_FRONT_ON"));

        assert_eq!(
            log.entries(),
            [
                (DeviceId::chassis(), "FORWARD".to_string()),
                (DeviceId::accessory(), "LIGHT_FRONT_ON".to_string()),
            ]
        );
        assert_eq!(log.count(&DeviceId::accessory(), "LIGHT_FRONT_ON"), 1);
    }

    #[test]
    fn clear_empties_the_log() {
        let (dispatcher, log) = SimBoards::new().with_chassis().build();
        dispatcher.send(&DeviceId::chassis(), &Command::Stop);
        log.clear();
        assert!(log.is_empty());
    }
}
