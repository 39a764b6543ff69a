//! Generic `MotionTransport` trait for anything that accepts line-oriented
//! motion commands (motor boards over serial, simulated boards in tests).
//!
//! Drivers implement this trait and register themselves with a
//! [`CommandDispatcher`][crate::dispatcher::CommandDispatcher].  The control
//! loop and the manual input layer only ever talk to the dispatcher, so a
//! serial board can be swapped for a simulated one without touching policy
//! code.

use kida_types::{DeviceId, TransportError};

/// A board that accepts textual commands.
pub trait MotionTransport: Send {
    /// Logical device this transport writes to, e.g. `dev00`.
    fn device_id(&self) -> &DeviceId;

    /// Write one command to the board.
    ///
    /// Implementations must bound the call with a write timeout so that a
    /// wedged board cannot stall the control loop.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the board is unreachable, closed, or
    /// the write times out.
    fn send(&mut self, command: &str) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process transport used only for tests.
    struct EchoTransport {
        id: DeviceId,
        last: Option<String>,
    }

    impl MotionTransport for EchoTransport {
        fn device_id(&self) -> &DeviceId {
            &self.id
        }

        fn send(&mut self, command: &str) -> Result<(), TransportError> {
            self.last = Some(command.to_string());
            Ok(())
        }
    }

    #[test]
    fn echo_transport_records_last_command() {
        let mut transport = EchoTransport {
            id: DeviceId::chassis(),
            last: None,
        };
        assert_eq!(transport.device_id().as_str(), "dev00");

        transport.send("FORWARD").unwrap();
        assert_eq!(transport.last.as_deref(), Some("FORWARD"));
    }
}
