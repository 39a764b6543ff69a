//! Human-readable status lines.
//!
//! Every control-loop tick publishes one line describing what the active
//! policy decided and why.  [`StatusBoard`] keeps the latest line for the
//! operator shell and mirrors each change to the log under the
//! `kida::status` target.

use std::sync::{Mutex, PoisonError};

use tracing::info;

/// Receiver of status lines.
pub trait StatusSink: Send + Sync {
    fn publish(&self, line: &str);
}

/// Latest-line status holder.
#[derive(Debug, Default)]
pub struct StatusBoard {
    latest: Mutex<Option<String>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published line.
    pub fn latest(&self) -> Option<String> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusSink for StatusBoard {
    fn publish(&self, line: &str) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        // Repeats are only logged once; the loop republishes every tick.
        if latest.as_deref() != Some(line) {
            info!(target: "kida::status", "{line}");
            *latest = Some(line.to_string());
        }
    }
}
