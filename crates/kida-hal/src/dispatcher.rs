//! [`CommandDispatcher`] – the single writer of outbound commands.
//!
//! The dispatcher owns every registered [`MotionTransport`] and routes a
//! [`Command`] to the board named by its [`DeviceId`].  It is shared behind an
//! `Arc` by the autonomous control loop, the manual input layer, and the mode
//! arbiter.
//!
//! # Locking
//!
//! Each transport sits behind its own `Mutex`, so writes to one board are
//! mutually exclusive while different boards never contend.  The transport
//! lock is always taken before the last-sent map, which keeps the
//! check-then-send in [`CommandDispatcher::send_if_changed`] atomic per board.
//!
//! # Failure policy
//!
//! [`CommandDispatcher::send`] and [`CommandDispatcher::send_if_changed`]
//! log and swallow transport failures: the robot may fail to move but the
//! caller keeps running and retries on its next tick.  Use
//! [`CommandDispatcher::try_send`] when the error itself is needed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use kida_types::{Command, DeviceId, TransportError};
use tracing::{debug, warn};

use crate::transport::MotionTransport;

/// Result of a de-duplicating send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The command reached the board.
    Delivered,
    /// The board already received this exact command last; nothing was written.
    Suppressed,
    /// The write failed and was logged.
    Failed,
}

/// Routes commands to registered boards.
///
/// Register transports with [`CommandDispatcher::register`] while building,
/// then share the dispatcher as `Arc<CommandDispatcher>`.
#[derive(Default)]
pub struct CommandDispatcher {
    transports: HashMap<DeviceId, Mutex<Box<dyn MotionTransport>>>,
    last_sent: Mutex<HashMap<DeviceId, String>>,
}

impl CommandDispatcher {
    /// Create a dispatcher with no boards.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport.  Any transport previously registered for the
    /// same device is replaced.
    pub fn register(&mut self, transport: Box<dyn MotionTransport>) {
        let id = transport.device_id().clone();
        self.transports.insert(id, Mutex::new(transport));
    }

    /// `true` when a transport is registered for `device`.
    pub fn is_registered(&self, device: &DeviceId) -> bool {
        self.transports.contains_key(device)
    }

    /// All registered devices, sorted.
    pub fn devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.transports.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Last command successfully delivered to `device`.
    pub fn last_sent(&self, device: &DeviceId) -> Option<String> {
        self.last_sent_map().get(device).cloned()
    }

    /// Write `command` to `device`, propagating any transport failure.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownDevice`] when nothing is registered
    /// for `device`, or the transport's own error when the write fails.
    pub fn try_send(&self, device: &DeviceId, command: &Command) -> Result<(), TransportError> {
        self.deliver(device, command, false).map(|_| ())
    }

    /// Write `command` to `device`; failures are logged and swallowed.
    ///
    /// Returns `true` when the command reached the board.
    pub fn send(&self, device: &DeviceId, command: &Command) -> bool {
        match self.deliver(device, command, false) {
            Ok(_) => true,
            Err(e) => {
                warn!(device = %device, command = %command, error = %e, "command not delivered");
                false
            }
        }
    }

    /// Like [`send`][Self::send], but skip the write when `command` equals the
    /// last command delivered to `device`.
    ///
    /// A failed write does not update the last-sent record, so the next call
    /// with the same command retries.
    pub fn send_if_changed(&self, device: &DeviceId, command: &Command) -> SendOutcome {
        match self.deliver(device, command, true) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(device = %device, command = %command, error = %e, "command not delivered");
                SendOutcome::Failed
            }
        }
    }

    /// Forget the last-sent record for every board, forcing the next
    /// de-duplicating send to write.
    pub fn reset_dedup(&self) {
        self.last_sent_map().clear();
    }

    fn deliver(
        &self,
        device: &DeviceId,
        command: &Command,
        skip_if_same: bool,
    ) -> Result<SendOutcome, TransportError> {
        let slot = self
            .transports
            .get(device)
            .ok_or_else(|| TransportError::UnknownDevice(device.to_string()))?;
        let mut transport = slot.lock().unwrap_or_else(PoisonError::into_inner);

        let wire = command.as_str();
        if skip_if_same && self.last_sent_map().get(device).map(String::as_str) == Some(wire) {
            return Ok(SendOutcome::Suppressed);
        }

        transport.send(wire)?;
        self.last_sent_map().insert(device.clone(), wire.to_string());
        debug!(device = %device, command = wire, "command sent");
        Ok(SendOutcome::Delivered)
    }

    fn last_sent_map(&self) -> MutexGuard<'_, HashMap<DeviceId, String>> {
        self.last_sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
