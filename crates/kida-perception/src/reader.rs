//! Background sensor reader threads.
//!
//! One [`SensorReader`] per physical board pulls lines from a [`LineSource`]
//! and feeds them through [`ingest_line`] into the shared [`SensorStore`].
//! Readers are fire-and-forget: the control loop never waits on them and
//! simply sees whatever value arrived last.
//!
//! A read error never ends the thread.  It is logged and the reader retries
//! after [`RETRY_DELAY`], which covers a board being unplugged and replugged.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use kida_types::DeviceId;
use tracing::{debug, info, warn};

use crate::ingest::{Ingested, ingest_line};
use crate::store::SensorStore;

/// Pause after a failed read before trying again.
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Longest partial line kept while waiting for a newline.
const MAX_PENDING: usize = 4096;

/// Granularity at which a sleeping reader notices [`SensorReader::stop`].
const STOP_POLL: Duration = Duration::from_millis(20);

// ────────────────────────────────────────────────────────────────────────────
// Line sources
// ────────────────────────────────────────────────────────────────────────────

/// Anything that yields newline-delimited text.
pub trait LineSource: Send {
    /// Next complete line without its terminator.
    ///
    /// `Ok(None)` means no full line is available yet (a read timeout); the
    /// caller should simply ask again.
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// [`LineSource`] over any byte stream, typically a cloned serial port handle.
///
/// Bytes are accumulated until a `\n` arrives.  Invalid UTF-8 is replaced
/// rather than rejected, so line noise costs one garbled line at most.
pub struct BufLineSource<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read + Send> BufLineSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self, end: usize) -> String {
        let raw: Vec<u8> = self.pending.drain(..end).collect();
        String::from_utf8_lossy(&raw).trim_end().to_string()
    }
}

impl<R: Read + Send> LineSource for BufLineSource<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = [0u8; 256];
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                return Ok(Some(self.take_line(pos + 1)));
            }
            if self.pending.len() > MAX_PENDING {
                self.pending.clear();
                return Ok(None);
            }

            match self.inner.read(&mut buf) {
                Ok(0) if !self.pending.is_empty() => {
                    let len = self.pending.len();
                    return Ok(Some(self.take_line(len)));
                }
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed"));
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reader thread
// ────────────────────────────────────────────────────────────────────────────

/// Handle to a running reader thread.  Dropping it signals the thread to
/// stop without waiting for it.
pub struct SensorReader {
    device: DeviceId,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SensorReader {
    /// Start reading `source` on a named background thread.
    ///
    /// # Errors
    ///
    /// Fails only if the OS refuses to create the thread.
    pub fn spawn<S>(device: DeviceId, source: S, store: Arc<SensorStore>) -> io::Result<Self>
    where
        S: LineSource + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let handle = thread::Builder::new()
            .name(format!("reader-{device}"))
            .spawn({
                let device = device.clone();
                let running = Arc::clone(&running);
                move || run_reader(device, source, store, running)
            })?;

        Ok(Self {
            device,
            running,
            handle: Some(handle),
        })
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// `true` until the thread has exited.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(device = %self.device, "sensor reader thread panicked");
            }
        }
    }
}

impl Drop for SensorReader {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn run_reader<S: LineSource>(
    device: DeviceId,
    mut source: S,
    store: Arc<SensorStore>,
    running: Arc<AtomicBool>,
) {
    info!(device = %device, "sensor reader started");
    while running.load(Ordering::SeqCst) {
        match source.next_line() {
            Ok(Some(line)) => match ingest_line(&store, &device, &line) {
                Ingested::Updated(n) => debug!(device = %device, channels = n, "sensor update"),
                Ingested::Alert(_) | Ingested::Unrecognised => {}
            },
            Ok(None) => {}
            Err(e) => {
                warn!(device = %device, error = %e, "sensor read failed, retrying");
                sleep_while_running(RETRY_DELAY, &running);
            }
        }
    }
    info!(device = %device, "sensor reader stopped");
}

fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}
