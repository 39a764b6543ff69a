//! Serial motion transport for the Arduino-class motor and accessory boards.
//!
//! Commands are written as newline-terminated ASCII lines (`"FORWARD\n"`).
//! The same port also carries sensor telemetry in the opposite direction;
//! [`SerialTransport::try_clone_port`] hands out a second handle so a reader
//! thread can consume it while the dispatcher keeps writing.

use std::io::{ErrorKind, Write};
use std::thread;
use std::time::Duration;

use kida_types::{DeviceId, KidaError, TransportError};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::transport::MotionTransport;

/// The boards reset when the port is opened and ignore input until booted.
const BOARD_RESET_DELAY: Duration = Duration::from_secs(2);

/// A board connected over UART.
pub struct SerialTransport {
    id: DeviceId,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` (8N1, no flow control).
    ///
    /// `timeout` bounds every read and write on the port.  Blocks for the
    /// board reset delay before returning.
    ///
    /// # Errors
    ///
    /// Returns [`KidaError::Io`] when the port cannot be opened.
    pub fn open(
        id: DeviceId,
        path: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Self, KidaError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| KidaError::Io(format!("could not open {id} on {path}: {e}")))?;

        thread::sleep(BOARD_RESET_DELAY);
        info!(device = %id, path, baud_rate, "serial board connected");

        Ok(Self { id, port })
    }

    /// Clone the underlying port handle for a telemetry reader.
    ///
    /// # Errors
    ///
    /// Returns [`KidaError::Io`] when the OS refuses to duplicate the handle.
    pub fn try_clone_port(&self) -> Result<Box<dyn SerialPort>, KidaError> {
        self.port
            .try_clone()
            .map_err(|e| KidaError::Io(format!("could not clone port for {}: {e}", self.id)))
    }
}

impl MotionTransport for SerialTransport {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{command}\n");
        self.port
            .write_all(line.as_bytes())
            .and_then(|()| self.port.flush())
            .map_err(|e| classify_io_error(&self.id, &e))
    }
}

fn classify_io_error(id: &DeviceId, err: &std::io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::TimedOut {
            device: id.to_string(),
        },
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::NotFound => {
            TransportError::NotConnected(id.to_string())
        }
        _ => TransportError::Write {
            device: id.to_string(),
            details: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn timeouts_are_classified() {
        let err = io::Error::new(ErrorKind::TimedOut, "slow board");
        assert_eq!(
            classify_io_error(&DeviceId::chassis(), &err),
            TransportError::TimedOut {
                device: "dev00".to_string()
            }
        );
    }

    #[test]
    fn broken_pipe_means_disconnected() {
        let err = io::Error::new(ErrorKind::BrokenPipe, "unplugged");
        assert_eq!(
            classify_io_error(&DeviceId::accessory(), &err),
            TransportError::NotConnected("dev01".to_string())
        );
    }

    #[test]
    fn other_errors_keep_details() {
        let err = io::Error::other("framing error");
        match classify_io_error(&DeviceId::chassis(), &err) {
            TransportError::Write { device, details } => {
                assert_eq!(device, "dev00");
                assert!(details.contains("framing"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn opening_a_missing_port_is_an_io_error() {
        let result = SerialTransport::open(
            DeviceId::chassis(),
            "/dev/kida-does-not-exist",
            9600,
            Duration::from_millis(10),
        );
        assert!(matches!(result, Err(KidaError::Io(_))));
    }
}
