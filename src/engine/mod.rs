// Copyright 2026 the ftdi-link developers
// SPDX-License-Identifier: Apache-2.0

//! The streaming I/O engine
//!
//! [`FtdiLink`] owns one opened transport and layers byte-exact framing on
//! top of its chunky, polling-based reads: exact-count receive, best-effort
//! drain, pattern-terminated receive, pattern skip, and separator-delimited
//! line reads that survive arbitrary fragmentation of the underlying USB
//! packets. All operations run synchronously on the caller's thread and
//! block at most for their timeout.

pub mod deadline;
pub mod leftover;
pub mod pattern;

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::common::{DriverKind, LinkConfig, LinkError, LinkResult, VidPidRegistry};
use crate::traits::SerialTransport;
use deadline::{Deadline, PollBackoff};
pub use deadline::DeadlinePolicy;
use leftover::LeftoverBuffer;
use pattern::SkipMatcher;

/// Direction of a payload passed to the data observer and the hex dump sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Tx,
    /// Device to host
    Rx,
}

impl Direction {
    fn marker(self) -> char {
        match self {
            Direction::Tx => '>',
            Direction::Rx => '<',
        }
    }
}

/// Callback invoked once per send and once per receive-terminating event.
pub type DataObserver = Box<dyn FnMut(&[u8], Direction) + Send>;

/// One opened FTDI link: a transport plus the engine state layered on it.
///
/// The link owns its transport exclusively; `&mut self` on every operation
/// enforces the one-reader/one-writer model statically. Dropping the link
/// closes the transport.
pub struct FtdiLink {
    transport: Box<dyn SerialTransport>,
    leftover: LeftoverBuffer,
    flow_control: bool,
    open: bool,
    default_timeout: Duration,
    dump_log: Option<PathBuf>,
    observer: Option<DataObserver>,
    last_error: Option<String>,
}

impl std::fmt::Debug for FtdiLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtdiLink")
            .field("open", &self.open)
            .field("flow_control", &self.flow_control)
            .field("leftover", &self.leftover.len())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "usb")]
fn open_usb(config: &LinkConfig, registry: &VidPidRegistry) -> LinkResult<Box<dyn SerialTransport>> {
    Ok(Box::new(crate::usb::UsbTransport::open(config, registry)?))
}

#[cfg(not(feature = "usb"))]
fn open_usb(_config: &LinkConfig, _registry: &VidPidRegistry) -> LinkResult<Box<dyn SerialTransport>> {
    Err(LinkError::InvalidConfig(
        "usb backend not enabled in this build".to_string(),
    ))
}

#[cfg(all(unix, feature = "vcp"))]
fn open_vcp(config: &LinkConfig) -> LinkResult<Box<dyn SerialTransport>> {
    Ok(Box::new(crate::vcp::VcpTransport::open(config)?))
}

#[cfg(not(all(unix, feature = "vcp")))]
fn open_vcp(_config: &LinkConfig) -> LinkResult<Box<dyn SerialTransport>> {
    Err(LinkError::InvalidConfig(
        "vcp backend not available on this platform".to_string(),
    ))
}

impl FtdiLink {
    /// Open a device through the backend selected in `config`.
    ///
    /// The registry supplies VID/PID candidates and name bindings for the
    /// USB backend; the VCP backend opens the configured device node.
    pub fn open(config: &LinkConfig, registry: &VidPidRegistry) -> LinkResult<Self> {
        config.validate()?;

        let transport = match config.driver {
            DriverKind::Usb => open_usb(config, registry)?,
            DriverKind::Vcp => open_vcp(config)?,
        };

        info!(driver = ?config.driver, device = %config.device, "link opened");
        Ok(Self::with_transport(transport, config))
    }

    /// Wrap an already-opened transport. Used by tests (loopback) and by
    /// applications bringing their own [`SerialTransport`] implementation.
    pub fn with_transport(transport: Box<dyn SerialTransport>, config: &LinkConfig) -> Self {
        Self {
            transport,
            leftover: LeftoverBuffer::new(),
            flow_control: config.flow_control,
            open: true,
            default_timeout: config.default_timeout,
            dump_log: config.dump_log.clone(),
            observer: None,
            last_error: None,
        }
    }

    /// Install the data observer.
    pub fn set_observer(&mut self, observer: impl FnMut(&[u8], Direction) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// Remove the data observer.
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Enable the append-only hex dump sink.
    pub fn enable_dump_log(&mut self, path: impl Into<PathBuf>) {
        self.dump_log = Some(path.into());
    }

    /// Latest human-readable failure message, retained until the next one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Timeout configured as the caller fallback.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Close the link. Idempotent: closing an already-closed link succeeds.
    pub fn close(&mut self) -> LinkResult<()> {
        if !self.open {
            return Ok(());
        }
        // The link counts as closed even when the backend complains;
        // subsequent calls must fail with NotOpened either way.
        let result = self.transport.close();
        self.open = false;
        info!("link closed");
        result.map_err(|e| self.fail(e))
    }

    /// Send `data`, in bursts capped by the transport's write step.
    ///
    /// The timeout is progress-based: it is only checked when a burst
    /// accepts zero bytes, and any partial burst resets the stall clock.
    /// Returns the full byte count on success.
    pub fn send(&mut self, data: &[u8], timeout: Duration) -> LinkResult<usize> {
        self.ensure_open()?;
        debug!(len = data.len(), ?timeout, "send");
        self.dump(data, Direction::Tx);

        let step = self.transport.max_write_step().max(1);
        let mut sent = 0;
        let mut stall_start = Instant::now();

        while sent < data.len() {
            let end = (sent + step).min(data.len());
            let n = match self.transport.write(&data[sent..end]) {
                Ok(n) => n,
                Err(e) => return Err(self.fail(e)),
            };

            // A burst can never legitimately accept more than was offered.
            if n > end - sent {
                return Err(self.fail(LinkError::Disconnected));
            }

            sent += n;
            if n == 0 {
                if stall_start.elapsed() > timeout {
                    return Err(self.fail(LinkError::Timeout { transferred: sent }));
                }
                std::thread::sleep(Duration::from_millis(1));
            } else {
                stall_start = Instant::now();
            }
        }

        self.notify(data, Direction::Tx);
        Ok(sent)
    }

    /// Receive exactly `want` bytes into `buf` (clamped to `buf.len()`).
    ///
    /// `want == 0` drains whatever is queued right now: the queue is sampled
    /// once and an empty queue yields `Ok(0)` immediately. Under
    /// [`DeadlinePolicy::Sliding`] the deadline is pushed forward on every
    /// read that makes progress; `Fixed` keeps the original deadline.
    ///
    /// On expiry the bytes collected so far stay in `buf` and their count
    /// travels in [`LinkError::Timeout`]. If room remains, `buf` is
    /// NUL-terminated after the received bytes for text-oriented callers.
    pub fn receive(
        &mut self,
        buf: &mut [u8],
        want: usize,
        timeout: Duration,
        policy: DeadlinePolicy,
    ) -> LinkResult<usize> {
        self.ensure_open()?;
        let mut want = want.min(buf.len());
        if want == 0 {
            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => return Err(self.fail(e)),
            };
            if queued == 0 {
                return Ok(0);
            }
            want = queued.min(buf.len());
        }
        debug!(want, ?timeout, ?policy, "receive");

        let mut deadline = Deadline::new(timeout, policy);
        let mut backoff = PollBackoff::new();
        let mut received = 0;

        while !deadline.expired() {
            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => return Err(self.fail(e)),
            };

            if queued == 0 {
                self.pulse_flow();
                backoff.sleep(deadline.remaining());
                continue;
            }

            let take = queued.min(want - received);
            let n = match self.transport.read(&mut buf[received..received + take]) {
                Ok(n) => n,
                Err(e) => {
                    self.dump(&buf[..received], Direction::Rx);
                    return Err(self.fail(e));
                }
            };
            self.pulse_flow();

            received += n;
            if received == want {
                break;
            }
            if n > 0 {
                deadline.progress();
            }
        }

        if received < buf.len() {
            buf[received] = 0;
        }

        self.notify(&buf[..received], Direction::Rx);
        self.dump(&buf[..received], Direction::Rx);

        if received < want {
            return Err(self.fail(LinkError::Timeout {
                transferred: received,
            }));
        }
        Ok(received)
    }

    /// Best-effort drain: poll up to `max_attempts` times and return as soon
    /// as anything at all was received.
    ///
    /// An empty-queue iteration pulses the flow signals and retries; it is
    /// not a failure. Callers needing an exact count use
    /// [`receive`](Self::receive) instead. A `timeout` of zero disables the
    /// deadline and leaves `max_attempts` as the only bound.
    pub fn receive_all(
        &mut self,
        buf: &mut [u8],
        max_attempts: u32,
        timeout: Duration,
    ) -> LinkResult<usize> {
        self.ensure_open()?;
        debug!(max_attempts, ?timeout, "receive_all");

        let deadline =
            (!timeout.is_zero()).then(|| Deadline::new(timeout, DeadlinePolicy::Fixed));
        let mut backoff = PollBackoff::new();
        let mut received = 0;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            if deadline.as_ref().is_some_and(|d| d.expired()) {
                break;
            }

            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => return Err(self.fail(e)),
            };

            if queued == 0 {
                self.pulse_flow();
                let budget = deadline
                    .as_ref()
                    .map(|d| d.remaining())
                    .unwrap_or(Duration::from_millis(100));
                backoff.sleep(budget);
                continue;
            }

            let take = queued.min(buf.len() - received);
            if take == 0 {
                break;
            }
            let n = match self.transport.read(&mut buf[received..received + take]) {
                Ok(n) => n,
                Err(e) => {
                    self.dump(&buf[..received], Direction::Rx);
                    return Err(self.fail(e));
                }
            };
            self.pulse_flow();

            received += n;
            if received > 0 {
                break;
            }
        }

        self.dump(&buf[..received], Direction::Rx);
        Ok(received)
    }

    /// Read until the accumulated bytes end with `pattern`, or the fixed
    /// deadline expires.
    ///
    /// After every read the full accumulation is re-checked for the needle
    /// as a suffix, so a needle split across any number of reads is still
    /// found. On success the returned buffer includes the needle. On expiry
    /// the accumulation is discarded; its length travels in the error.
    pub fn receive_until_pattern(
        &mut self,
        pattern: &[u8],
        timeout: Duration,
    ) -> LinkResult<Vec<u8>> {
        self.ensure_open()?;
        if pattern.is_empty() {
            return Err(self.fail(LinkError::InvalidParameter("pattern must not be empty")));
        }
        debug!(pattern_len = pattern.len(), ?timeout, "receive_until_pattern");

        let deadline = Deadline::new(timeout, DeadlinePolicy::Fixed);
        let mut backoff = PollBackoff::new();
        let mut acc: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 4096];

        while !deadline.expired() {
            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => return Err(self.fail(e)),
            };

            if queued == 0 {
                self.pulse_flow();
                backoff.sleep(deadline.remaining());
                continue;
            }

            let take = queued.min(chunk.len());
            let n = match self.transport.read(&mut chunk[..take]) {
                Ok(n) => n,
                Err(e) => {
                    self.dump(&acc, Direction::Rx);
                    return Err(self.fail(e));
                }
            };
            self.pulse_flow();

            acc.extend_from_slice(&chunk[..n]);
            if n > 0 && acc.ends_with(pattern) {
                self.notify(&acc, Direction::Rx);
                self.dump(&acc, Direction::Rx);
                return Ok(acc);
            }
        }

        let transferred = acc.len();
        self.dump(&acc, Direction::Rx);
        Err(self.fail(LinkError::Timeout { transferred }))
    }

    /// Discard bytes until `pattern` has been observed anywhere in the
    /// stream, using a fixed-size scratch buffer.
    ///
    /// Returns the total number of bytes consumed, including the needle and
    /// any bytes read in the same chunk after it. On expiry the count of
    /// bytes observed (and discarded) travels in [`LinkError::Timeout`];
    /// zero means nothing was ever seen.
    pub fn skip_until_pattern(&mut self, pattern: &[u8], timeout: Duration) -> LinkResult<usize> {
        self.ensure_open()?;
        if pattern.is_empty() {
            return Err(self.fail(LinkError::InvalidParameter("pattern must not be empty")));
        }
        debug!(pattern_len = pattern.len(), ?timeout, "skip_until_pattern");

        let mut matcher = SkipMatcher::new(pattern);
        let deadline = Deadline::new(timeout, DeadlinePolicy::Fixed);
        let mut backoff = PollBackoff::new();
        let mut scratch = [0u8; 4096];
        let mut total = 0;

        while !deadline.expired() {
            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => return Err(self.fail(e)),
            };

            if queued == 0 {
                self.pulse_flow();
                backoff.sleep(deadline.remaining());
                continue;
            }

            let take = queued.min(scratch.len());
            let n = match self.transport.read(&mut scratch[..take]) {
                Ok(n) => n,
                Err(e) => return Err(self.fail(e)),
            };
            self.pulse_flow();

            total += n;
            for &byte in &scratch[..n] {
                if matcher.push(byte) {
                    trace!(total, "skip pattern matched");
                    return Ok(total);
                }
            }
        }

        Err(self.fail(LinkError::Timeout { transferred: total }))
    }

    /// Read one `separator`-terminated line.
    ///
    /// The leftover buffer is consulted first: if it already holds the
    /// separator the line is returned without touching the transport.
    /// Otherwise the leftover seeds the working line and the transport is
    /// polled until the separator arrives; bytes after it are retained as
    /// the new leftover.
    ///
    /// On timeout (or transport error) the working line is pushed back into
    /// the leftover buffer — no byte read from hardware is lost, and a later
    /// call still assembles the line once the separator shows up.
    pub fn get_line(&mut self, separator: u8, timeout: Duration) -> LinkResult<Vec<u8>> {
        self.ensure_open()?;

        if let Some(line) = self.leftover.take_line(separator) {
            trace!(len = line.len(), "line served from leftover");
            return Ok(line);
        }

        let mut line = self.leftover.take_all();
        let deadline = Deadline::new(timeout, DeadlinePolicy::Fixed);
        let mut backoff = PollBackoff::new();
        let mut chunk = [0u8; 1024];

        while !deadline.expired() {
            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => {
                    self.leftover.restore_front(line);
                    return Err(self.fail(e));
                }
            };

            if queued == 0 {
                self.pulse_flow();
                backoff.sleep(deadline.remaining());
                continue;
            }

            let take = queued.min(chunk.len());
            let n = match self.transport.read(&mut chunk[..take]) {
                Ok(n) => n,
                Err(e) => {
                    self.leftover.restore_front(line);
                    return Err(self.fail(e));
                }
            };
            self.pulse_flow();

            if let Some(pos) = chunk[..n].iter().position(|&b| b == separator) {
                line.extend_from_slice(&chunk[..pos]);
                self.leftover.put(&chunk[pos + 1..n]);
                debug!(len = line.len(), leftover = self.leftover.len(), "line complete");
                return Ok(line);
            }
            line.extend_from_slice(&chunk[..n]);
        }

        let transferred = line.len();
        self.leftover.restore_front(line);
        Err(self.fail(LinkError::Timeout { transferred }))
    }

    /// True when the leftover buffer already holds a complete line.
    /// Inspects engine state only; never touches the transport.
    pub fn line_available(&self, separator: u8) -> bool {
        self.leftover.contains(separator)
    }

    /// Read and discard everything currently queued.
    /// Returns the number of bytes thrown away.
    pub fn drain(&mut self) -> LinkResult<usize> {
        self.ensure_open()?;
        let mut scratch = [0u8; 1024];
        let mut total = 0;

        loop {
            let queued = match self.transport.queued_bytes() {
                Ok(q) => q,
                Err(e) => return Err(self.fail(e)),
            };
            if queued == 0 {
                break;
            }
            let take = queued.min(scratch.len());
            let n = match self.transport.read(&mut scratch[..take]) {
                Ok(n) => n,
                Err(e) => return Err(self.fail(e)),
            };
            if n == 0 {
                break;
            }
            total += n;
        }

        if total > 0 {
            debug!(total, "drained stale bytes");
        }
        Ok(total)
    }

    fn ensure_open(&mut self) -> LinkResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(self.fail(LinkError::NotOpened))
        }
    }

    /// Retain the message and hand the error back to the caller.
    fn fail(&mut self, err: LinkError) -> LinkError {
        self.last_error = Some(err.to_string());
        err
    }

    /// Pulse DTR/RTS when the engine manages draining itself: only with
    /// hardware handshake off and the device not addressed as a plain
    /// serial port. Pulse failures are non-fatal; the next read or queue
    /// query surfaces real trouble.
    fn pulse_flow(&mut self) {
        if self.flow_control || self.transport.is_serial_port() {
            return;
        }
        if let Err(e) = self.transport.pulse_flow_signals() {
            trace!(error = %e, "flow signal pulse failed");
        }
    }

    fn notify(&mut self, data: &[u8], dir: Direction) {
        if let Some(observer) = self.observer.as_mut() {
            observer(data, dir);
        }
    }

    /// One line per event: direction marker, then the payload as hex.
    fn dump(&mut self, data: &[u8], dir: Direction) {
        let Some(path) = &self.dump_log else {
            return;
        };
        let mut line = String::with_capacity(data.len() * 3 + 2);
        line.push(dir.marker());
        for byte in data {
            line.push_str(&format!("{byte:02X} "));
        }
        line.push('\n');

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            warn!(error = %e, "hex dump write failed");
        }
    }
}

impl Drop for FtdiLink {
    fn drop(&mut self) {
        if self.open {
            let _ = self.transport.close();
        }
    }
}
