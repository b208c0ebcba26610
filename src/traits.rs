// Copyright 2026 the ftdi-link developers
// SPDX-License-Identifier: Apache-2.0

//! Transport capability trait
//!
//! [`SerialTransport`] is the only surface the streaming engine talks to.
//! Driver backends (direct USB, kernel VCP) and the in-memory loopback all
//! implement it, so engine behavior can be tested without hardware.

use crate::common::LinkResult;

/// An opened hardware channel.
///
/// One transport is owned by exactly one [`FtdiLink`](crate::FtdiLink);
/// implementations are `Send` but need no internal locking.
pub trait SerialTransport: Send {
    /// Submit one write burst. Returns the number of bytes the driver
    /// accepted, which may be less than `data.len()`. A return value larger
    /// than the request is only possible when the device has dropped off the
    /// bus; the engine treats it as a disconnect.
    fn write(&mut self, data: &[u8]) -> LinkResult<usize>;

    /// Best-effort read into `buf`. Returns 0 when nothing is available.
    fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize>;

    /// Number of received bytes ready to be read right now.
    fn queued_bytes(&mut self) -> LinkResult<usize>;

    /// Assert DTR and clear RTS. Called by the engine around each poll when
    /// hardware handshake is off and the device is not addressed as a plain
    /// serial port, to keep the chip's internal buffer draining.
    fn pulse_flow_signals(&mut self) -> LinkResult<()>;

    /// Largest burst the driver accepts in one write call.
    fn max_write_step(&self) -> usize;

    /// True when the device is addressed as a plain serial port (the kernel
    /// driver then owns the modem lines and flow pulsing is skipped).
    fn is_serial_port(&self) -> bool;

    /// Release the channel. Idempotent: closing twice is not an error, and
    /// every call after a close fails with `NotOpened`.
    fn close(&mut self) -> LinkResult<()>;
}
