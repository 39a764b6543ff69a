//! `kida-perception` – sensor state for the control core.
//!
//! Turns the two boards' serial chatter into the typed sample the autonomous
//! policies decide on.
//!
//! # Modules
//!
//! - [`store`] – [`SensorStore`]: shared last-value map from channel to raw
//!   reading, written by reader threads and sampled by the control loop.
//! - [`parser`] – tolerant conversion of raw readings into `Option<i32>`,
//!   including the ultrasonic validity floor.
//! - [`ingest`] – [`ingest_line`]: applies one board report line to the
//!   store.
//! - [`reader`] – [`SensorReader`]: background thread pumping a
//!   [`LineSource`] into the store.

pub mod ingest;
pub mod parser;
pub mod reader;
pub mod store;

pub use ingest::{Ingested, ingest_line};
pub use reader::{BufLineSource, LineSource, SensorReader};
pub use store::SensorStore;
