// Copyright 2026 the ftdi-link developers
// SPDX-License-Identifier: Apache-2.0

//! Serial-port driver backend
//!
//! Talks to the kernel FTDI serial driver through its device node (for
//! example `/dev/ttyUSB0`). The port is put into raw non-blocking mode so
//! reads never stall the engine poll loops; line speed and framing stay
//! whatever the driver has configured.

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use tracing::info;

use crate::common::{LinkConfig, LinkError, LinkResult};
use crate::traits::SerialTransport;

const WRITE_STEP: usize = 4096;

fn os_err() -> LinkError {
    LinkError::Io(std::io::Error::last_os_error())
}

/// FTDI device reached through the kernel serial driver's device node.
pub struct VcpTransport {
    fd: Option<OwnedFd>,
}

impl VcpTransport {
    /// Open the device node named by `config.device` in raw non-blocking
    /// mode. Hardware RTS/CTS handshake follows `config.flow_control`; any
    /// stale driver buffers are flushed before returning.
    pub fn open(config: &LinkConfig) -> LinkResult<Self> {
        let path = CString::new(config.device.as_str())
            .map_err(|_| LinkError::InvalidParameter("device path contains NUL"))?;

        // SAFETY: path is a valid NUL-terminated string; the returned fd is
        // owned immediately.
        let raw = unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
            )
        };
        if raw < 0 {
            return Err(os_err());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut tio = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut tio) } != 0 {
            return Err(os_err());
        }
        unsafe { libc::cfmakeraw(&mut tio) };
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        if config.flow_control {
            tio.c_cflag |= libc::CRTSCTS;
        } else {
            tio.c_cflag &= !libc::CRTSCTS;
        }
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(fd.as_raw_fd(), libc::TCSANOW, &tio) } != 0 {
            return Err(os_err());
        }
        if unsafe { libc::tcflush(fd.as_raw_fd(), libc::TCIOFLUSH) } != 0 {
            return Err(os_err());
        }

        info!(device = %config.device, "serial-port transport ready");
        Ok(Self { fd: Some(fd) })
    }

    fn raw_fd(&self) -> LinkResult<i32> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(LinkError::NotOpened)
    }
}

impl SerialTransport for VcpTransport {
    fn write(&mut self, data: &[u8]) -> LinkResult<usize> {
        let fd = self.raw_fd()?;
        let burst = data.len().min(WRITE_STEP);
        let n = unsafe { libc::write(fd, data.as_ptr().cast(), burst) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(LinkError::Io(err));
        }
        Ok(n as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize> {
        let fd = self.raw_fd()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(LinkError::Io(err));
        }
        Ok(n as usize)
    }

    fn queued_bytes(&mut self) -> LinkResult<usize> {
        let fd = self.raw_fd()?;
        let mut queued: libc::c_int = 0;
        if unsafe { libc::ioctl(fd, libc::FIONREAD as _, &mut queued) } != 0 {
            return Err(os_err());
        }
        Ok(queued as usize)
    }

    fn pulse_flow_signals(&mut self) -> LinkResult<()> {
        let fd = self.raw_fd()?;
        let dtr: libc::c_int = libc::TIOCM_DTR;
        let rts: libc::c_int = libc::TIOCM_RTS;
        if unsafe { libc::ioctl(fd, libc::TIOCMBIS as _, &dtr) } != 0 {
            return Err(os_err());
        }
        if unsafe { libc::ioctl(fd, libc::TIOCMBIC as _, &rts) } != 0 {
            return Err(os_err());
        }
        Ok(())
    }

    fn max_write_step(&self) -> usize {
        WRITE_STEP
    }

    fn is_serial_port(&self) -> bool {
        true
    }

    fn close(&mut self) -> LinkResult<()> {
        // Dropping the fd closes it; repeat calls are no-ops.
        self.fd = None;
        Ok(())
    }
}
