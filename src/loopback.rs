// Copyright 2026 the ftdi-link developers
// SPDX-License-Identifier: Apache-2.0

//! In-memory scripted transport
//!
//! [`LoopbackTransport`] implements [`SerialTransport`] without hardware:
//! received data is staged ahead of time as chunks (optionally gated behind
//! a delay), writes are captured for inspection, and fault knobs let tests
//! force partial bursts, stalls, and the byte-count overrun that signals a
//! disconnected device.
//!
//! State lives behind a shared handle: clone the transport before handing
//! it to the engine and keep the clone to script and inspect it.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{LinkError, LinkResult};
use crate::traits::SerialTransport;

#[derive(Debug)]
struct StagedChunk {
    data: Vec<u8>,
    due: Instant,
}

#[derive(Debug)]
struct Inner {
    staged: VecDeque<StagedChunk>,
    readable: Vec<u8>,
    written: Vec<u8>,
    write_cap: usize,
    write_step: usize,
    overrun_writes: bool,
    serial_port: bool,
    flow_pulses: usize,
    closed: bool,
}

impl Inner {
    /// Move every chunk whose delay has elapsed into the readable pool.
    fn promote_due(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.staged.front() {
            if front.due > now {
                break;
            }
            let chunk = self.staged.pop_front().unwrap();
            self.readable.extend_from_slice(&chunk.data);
        }
    }

    fn ensure_open(&self) -> LinkResult<()> {
        if self.closed {
            Err(LinkError::NotOpened)
        } else {
            Ok(())
        }
    }
}

/// Scripted in-memory transport for tests and dry-run simulation.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<Inner>>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                staged: VecDeque::new(),
                readable: Vec::new(),
                written: Vec::new(),
                write_cap: usize::MAX,
                write_step: 4096,
                overrun_writes: false,
                serial_port: false,
                flow_pulses: 0,
                closed: false,
            })),
        }
    }

    /// Stage bytes to become readable immediately.
    pub fn stage(&self, data: &[u8]) {
        self.stage_after(data, Duration::ZERO);
    }

    /// Stage bytes that become readable once `delay` has elapsed. Chunks
    /// are released in staging order, so a later chunk never overtakes an
    /// earlier one even with a shorter delay.
    pub fn stage_after(&self, data: &[u8], delay: Duration) {
        let mut inner = self.inner.lock();
        let previous_due = inner.staged.back().map(|c| c.due);
        let mut due = Instant::now() + delay;
        if let Some(prev) = previous_due {
            due = due.max(prev);
        }
        inner.staged.push_back(StagedChunk {
            data: data.to_vec(),
            due,
        });
    }

    /// Cap the number of bytes a single write burst accepts.
    /// Zero simulates a stalled device.
    pub fn set_write_cap(&self, cap: usize) {
        self.inner.lock().write_cap = cap;
    }

    /// Burst size reported through [`SerialTransport::max_write_step`].
    pub fn set_write_step(&self, step: usize) {
        self.inner.lock().write_step = step;
    }

    /// Make write bursts report one byte more than requested, the way a
    /// disconnected device does.
    pub fn fail_writes_with_overrun(&self) {
        self.inner.lock().overrun_writes = true;
    }

    /// Present the transport as a plain serial port (suppresses engine
    /// flow-signal pulsing).
    pub fn set_serial_port(&self, serial: bool) {
        self.inner.lock().serial_port = serial;
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().written.clone()
    }

    /// Take and clear the captured writes.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.lock().written)
    }

    /// How many times the engine pulsed the flow signals.
    pub fn flow_pulses(&self) -> usize {
        self.inner.lock().flow_pulses
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl SerialTransport for LoopbackTransport {
    fn write(&mut self, data: &[u8]) -> LinkResult<usize> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if inner.overrun_writes {
            return Ok(data.len() + 1);
        }
        let accepted = data.len().min(inner.write_cap);
        inner.written.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.promote_due();
        let n = inner.readable.len().min(buf.len());
        buf[..n].copy_from_slice(&inner.readable[..n]);
        inner.readable.drain(..n);
        Ok(n)
    }

    fn queued_bytes(&mut self) -> LinkResult<usize> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.promote_due();
        Ok(inner.readable.len())
    }

    fn pulse_flow_signals(&mut self) -> LinkResult<()> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        inner.flow_pulses += 1;
        Ok(())
    }

    fn max_write_step(&self) -> usize {
        self.inner.lock().write_step
    }

    fn is_serial_port(&self) -> bool {
        self.inner.lock().serial_port
    }

    fn close(&mut self) -> LinkResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_chunks_keep_order() {
        let lb = LoopbackTransport::new();
        lb.stage_after(b"first", Duration::from_millis(5));
        lb.stage(b"second"); // shorter delay, must not overtake
        std::thread::sleep(Duration::from_millis(10));

        let mut t = lb.clone();
        let mut buf = [0u8; 16];
        let n = t.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"firstsecond");
    }

    #[test]
    fn write_cap_limits_bursts() {
        let lb = LoopbackTransport::new();
        lb.set_write_cap(3);
        let mut t = lb.clone();
        assert_eq!(t.write(b"abcdef").unwrap(), 3);
        assert_eq!(lb.written(), b"abc");
    }

    #[test]
    fn closed_transport_rejects_io() {
        let lb = LoopbackTransport::new();
        let mut t = lb.clone();
        t.close().unwrap();
        assert!(matches!(t.write(b"x"), Err(LinkError::NotOpened)));
        assert!(matches!(t.queued_bytes(), Err(LinkError::NotOpened)));
    }
}
