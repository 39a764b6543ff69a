//! `kida-hal` – motion transports and the command dispatcher.
//!
//! # Modules
//!
//! - [`transport`] – [`MotionTransport`]: anything that accepts
//!   newline-terminated commands for one logical board.
//! - [`serial`] – [`SerialTransport`]: a board on a UART, opened through the
//!   `serialport` crate with bounded read/write timeouts.
//! - [`sim`] – [`SimTransport`] and the [`SimBoards`] builder: recorded,
//!   fault-injectable boards for tests and `--sim` runs.
//! - [`dispatcher`] – [`CommandDispatcher`]: the single writer of outbound
//!   commands, with per-board mutual exclusion and last-command
//!   de-duplication.

pub mod dispatcher;
pub mod serial;
pub mod sim;
pub mod transport;

pub use dispatcher::{CommandDispatcher, SendOutcome};
pub use serial::SerialTransport;
pub use sim::{FaultSwitch, SimBoards, SimLog, SimTransport};
pub use transport::MotionTransport;
