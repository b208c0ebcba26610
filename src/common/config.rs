//! Link configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::error::{LinkError, LinkResult};

/// Which driver backend to open the device through.
///
/// Both backends compile into one build; the choice is made here at runtime,
/// so a test suite (or an application probing for the best fit) can exercise
/// either without rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Claim the USB interface directly and drive the bulk endpoints
    Usb,
    /// Go through the kernel's virtual COM port device node
    Vcp,
}

/// Configuration for opening a link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Backend to open through
    pub driver: DriverKind,

    /// Device identity: product description or serial (USB backend),
    /// or the device node path such as `/dev/ttyUSB0` (VCP backend)
    pub device: String,

    /// Match `device` against the serial number instead of the description
    pub open_by_serial: bool,

    /// Enable hardware RTS/CTS handshake. When off (and the device is not
    /// addressed as a plain serial port) the engine pulses DTR/RTS itself
    /// around each poll to keep the chip's buffer draining.
    pub flow_control: bool,

    /// Chip latency timer in milliseconds (1-255)
    pub latency_ms: u8,

    /// Backend read transfer size
    pub read_chunk: usize,

    /// Backend write transfer size
    pub write_chunk: usize,

    /// Timeout applied by callers that have no better value
    pub default_timeout: Duration,

    /// Append-only hex dump of every send/receive, one line per event
    pub dump_log: Option<PathBuf>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Usb,
            device: String::new(),
            open_by_serial: false,
            flow_control: false,
            latency_ms: 2,
            read_chunk: 0x10000,
            write_chunk: 0x10000,
            default_timeout: Duration::from_secs(2),
            dump_log: None,
        }
    }
}

impl LinkConfig {
    /// Create a config for the given backend and device identifier
    pub fn new(driver: DriverKind, device: impl Into<String>) -> Self {
        Self {
            driver,
            device: device.into(),
            ..Default::default()
        }
    }

    /// Match the device by serial number
    pub fn by_serial(mut self) -> Self {
        self.open_by_serial = true;
        self
    }

    /// Enable hardware RTS/CTS flow control
    pub fn with_flow_control(mut self) -> Self {
        self.flow_control = true;
        self
    }

    /// Set the chip latency timer
    pub fn with_latency_ms(mut self, latency_ms: u8) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set read/write transfer sizes
    pub fn with_chunk_sizes(mut self, read_chunk: usize, write_chunk: usize) -> Self {
        self.read_chunk = read_chunk;
        self.write_chunk = write_chunk;
        self
    }

    /// Set the fallback timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Enable the hex dump sink
    pub fn with_dump_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_log = Some(path.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> LinkResult<()> {
        if self.device.is_empty() {
            return Err(LinkError::InvalidConfig(
                "device identifier cannot be empty".to_string(),
            ));
        }

        if self.read_chunk == 0 || self.write_chunk == 0 {
            return Err(LinkError::InvalidConfig(
                "transfer chunk sizes must be greater than 0".to_string(),
            ));
        }

        if self.latency_ms == 0 {
            return Err(LinkError::InvalidConfig(
                "latency timer must be between 1 and 255 ms".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_invalid_until_device_is_set() {
        assert!(LinkConfig::default().validate().is_err());
        assert!(LinkConfig::new(DriverKind::Usb, "UM232H").validate().is_ok());
    }

    #[test]
    fn builder_chain() {
        let cfg = LinkConfig::new(DriverKind::Vcp, "/dev/ttyUSB0")
            .with_flow_control()
            .with_latency_ms(4)
            .with_chunk_sizes(4096, 4096)
            .with_default_timeout(Duration::from_millis(500));
        assert!(cfg.flow_control);
        assert_eq!(cfg.latency_ms, 4);
        assert_eq!(cfg.read_chunk, 4096);
        assert_eq!(cfg.default_timeout, Duration::from_millis(500));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_chunks_and_latency() {
        let cfg = LinkConfig::new(DriverKind::Usb, "dev").with_chunk_sizes(0, 4096);
        assert!(cfg.validate().is_err());
        let cfg = LinkConfig::new(DriverKind::Usb, "dev").with_latency_ms(0);
        assert!(cfg.validate().is_err());
    }
}
