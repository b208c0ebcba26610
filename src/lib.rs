// Copyright 2026 the ftdi-link developers
// SPDX-License-Identifier: Apache-2.0

//! # ftdi-link
//!
//! Timeout-driven byte-stream engine for FTDI USB-serial links, with pluggable
//! driver backends selected at runtime.
//!
//! The engine layers buffering, deadlines, and framing on top of a raw
//! transport: exact-count receives, best-effort drains, pattern-terminated
//! reads, and delimiter-based line extraction, all bounded by caller-supplied
//! timeouts. Bytes pulled off the wire past what a call returns are retained
//! internally and served to later calls, so nothing read is ever lost.
//!
//! ## Driver backends
//!
//! Two backends implement the [`SerialTransport`] trait:
//!
//! - **usb** ([`usb::UsbTransport`]): claims the FTDI interface and drives
//!   its bulk endpoints directly over USB, with no kernel serial driver in
//!   the path.
//! - **vcp** ([`vcp::VcpTransport`]): goes through the kernel FTDI serial
//!   driver's device node (for example `/dev/ttyUSB0`).
//!
//! The backend is chosen per link by [`DriverKind`] in the [`LinkConfig`].
//!
//! ## Feature Flags
//!
//! Both backends are enabled by default; turn one off to drop its native
//! dependency:
//!
//! ```toml
//! # Direct USB only
//! [dependencies]
//! ftdi-link = { version = "0.1", default-features = false, features = ["usb"] }
//!
//! # Kernel serial driver only
//! [dependencies]
//! ftdi-link = { version = "0.1", default-features = false, features = ["vcp"] }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ftdi_link::{DeadlinePolicy, DriverKind, FtdiLink, LinkConfig, VidPidRegistry};
//!
//! let config = LinkConfig::new(DriverKind::Usb, "FT232R USB UART")
//!     .with_default_timeout(Duration::from_secs(2));
//! let registry = VidPidRegistry::default();
//!
//! let mut link = FtdiLink::open(&config, &registry)?;
//! link.send(b"AT\r\n", Duration::from_secs(1))?;
//!
//! let line = link.get_line(b'\n', Duration::from_secs(1))?;
//! println!("reply: {:?}", line);
//!
//! let mut buf = [0u8; 64];
//! let n = link.receive(&mut buf, 16, Duration::from_secs(1), DeadlinePolicy::Sliding)?;
//! println!("got {n} bytes");
//! # Ok::<(), ftdi_link::LinkError>(())
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into layers:
//!
//! 1. **Common**: Shared types (errors, config, VID/PID registry)
//! 2. **Traits**: The driver-agnostic [`SerialTransport`] interface
//! 3. **Engine**: Buffering, deadlines, and pattern matching over any transport
//! 4. **Backends**: The USB and serial-port drivers, plus an in-memory
//!    loopback for tests
//!
//! This design allows swapping drivers without changing application logic.

pub mod common;
pub mod engine;
pub mod loopback;
pub mod traits;

#[cfg(feature = "usb")]
pub mod usb;

#[cfg(all(unix, feature = "vcp"))]
pub mod vcp;

// Re-export commonly used types
pub use common::{DriverKind, LinkConfig, LinkError, LinkResult, VidPid, VidPidRegistry};

pub use engine::{DataObserver, DeadlinePolicy, Direction, FtdiLink};

pub use loopback::LoopbackTransport;

pub use traits::SerialTransport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::common::*;
    pub use crate::engine::{DataObserver, DeadlinePolicy, Direction, FtdiLink};
    pub use crate::loopback::LoopbackTransport;
    pub use crate::traits::SerialTransport;

    #[cfg(feature = "usb")]
    pub use crate::usb::UsbTransport;

    #[cfg(all(unix, feature = "vcp"))]
    pub use crate::vcp::VcpTransport;
}
