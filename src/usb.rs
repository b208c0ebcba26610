// Copyright 2026 the ftdi-link developers
// SPDX-License-Identifier: Apache-2.0

//! Direct-USB driver backend
//!
//! Claims the FTDI interface and drives its bulk endpoints itself, without
//! any kernel serial driver in the path. The chip prepends two modem-status
//! bytes to every USB packet it returns; this backend strips them and keeps
//! the surplus payload in an internal buffer, whose fill level backs
//! [`SerialTransport::queued_bytes`].

use std::time::Duration;

use nusb::transfer::{Bulk, ControlOut, ControlType, In, Out, Recipient};
use nusb::MaybeFuture;
use tracing::{debug, info};

use crate::common::{LinkConfig, LinkError, LinkResult, VidPid, VidPidRegistry};
use crate::traits::SerialTransport;

// FTDI vendor requests (SIO protocol)
const SIO_RESET_REQUEST: u8 = 0x00;
const SIO_SET_MODEM_CTRL_REQUEST: u8 = 0x01;
const SIO_SET_FLOW_CTRL_REQUEST: u8 = 0x02;
const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;

const SIO_RESET_SIO: u16 = 0;
const SIO_RESET_PURGE_RX: u16 = 1;
const SIO_RESET_PURGE_TX: u16 = 2;

const SIO_DISABLE_FLOW_CTRL: u16 = 0x0000;
const SIO_RTS_CTS_HS: u16 = 0x0100;

const SIO_SET_DTR_HIGH: u16 = 0x0101;
const SIO_SET_RTS_LOW: u16 = 0x0200;

// Interface A endpoints; the control-transfer index for interface A is 1.
const INTERFACE_NUM: u8 = 0;
const USB_INDEX: u16 = 1;
const READ_EP: u8 = 0x81;
const WRITE_EP: u8 = 0x02;

// The chip answers IN requests within its latency timer, so these bound
// genuine trouble rather than ordinary idle polls.
const READ_TIMEOUT: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

fn usb_err(e: impl std::fmt::Display) -> LinkError {
    LinkError::Driver(e.to_string())
}

fn transfer_err(e: nusb::transfer::TransferError) -> LinkError {
    match e {
        nusb::transfer::TransferError::Disconnected => LinkError::Disconnected,
        other => LinkError::Driver(other.to_string()),
    }
}

/// FTDI device driven over raw USB bulk transfers.
pub struct UsbTransport {
    device: Option<nusb::Device>,
    interface: Option<nusb::Interface>,
    max_packet_size: usize,
    read_chunk: usize,
    write_chunk: usize,
    // Payload already pulled off the wire but not yet handed out
    readbuf: Vec<u8>,
    readbuf_off: usize,
    readbuf_len: usize,
}

impl UsbTransport {
    /// Find, claim, and initialize the device named by `config`.
    ///
    /// Candidate VID/PID pairs come from the registry; a name binding in the
    /// registry narrows the match to one specific pair. The device is then
    /// reset, both FIFOs purged, flow control and the latency timer set, in
    /// that order.
    pub fn open(config: &LinkConfig, registry: &VidPidRegistry) -> LinkResult<Self> {
        let bound = registry.lookup(&config.device);

        let mut selected = None;
        for info in nusb::list_devices().wait().map_err(usb_err)? {
            let id = VidPid::new(info.vendor_id(), info.product_id());
            let id_matches = match bound {
                Some(wanted) => id == wanted,
                None => registry.candidates().contains(&id),
            };
            if !id_matches {
                continue;
            }

            let name_matches = if config.open_by_serial {
                info.serial_number() == Some(config.device.as_str())
            } else {
                info.product_string() == Some(config.device.as_str())
            };
            if name_matches {
                selected = Some(info);
                break;
            }
        }

        let info = selected.ok_or_else(|| {
            LinkError::Driver(format!("no device matching \"{}\"", config.device))
        })?;

        let device = info.open().wait().map_err(usb_err)?;
        let interface = device
            .detach_and_claim_interface(INTERFACE_NUM)
            .wait()
            .map_err(usb_err)?;

        let max_packet_size = probe_max_packet_size(&device);
        debug!(max_packet_size, "claimed FTDI interface");

        let mut transport = Self {
            device: Some(device),
            interface: Some(interface),
            max_packet_size,
            read_chunk: config.read_chunk,
            write_chunk: config.write_chunk,
            readbuf: vec![0u8; config.read_chunk],
            readbuf_off: 0,
            readbuf_len: 0,
        };

        transport.control_out(SIO_RESET_REQUEST, SIO_RESET_SIO, USB_INDEX)?;
        transport.control_out(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX, USB_INDEX)?;
        transport.control_out(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX, USB_INDEX)?;

        let flow = if config.flow_control {
            SIO_RTS_CTS_HS
        } else {
            SIO_DISABLE_FLOW_CTRL
        };
        transport.control_out(SIO_SET_FLOW_CTRL_REQUEST, 0, flow | USB_INDEX)?;
        transport.control_out(
            SIO_SET_LATENCY_TIMER_REQUEST,
            config.latency_ms as u16,
            USB_INDEX,
        )?;

        info!(device = %config.device, "usb transport ready");
        Ok(transport)
    }

    fn iface(&self) -> LinkResult<&nusb::Interface> {
        self.interface.as_ref().ok_or(LinkError::NotOpened)
    }

    fn control_out(&self, request: u8, value: u16, index: u16) -> LinkResult<()> {
        self.iface()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data: &[],
                },
                WRITE_TIMEOUT,
            )
            .wait()
            .map_err(usb_err)?;
        Ok(())
    }

    /// Pull one bulk transfer off the wire into the internal buffer and
    /// strip the per-packet status bytes. Only called when the buffer is
    /// empty.
    fn refill(&mut self) -> LinkResult<()> {
        let iface = self.iface()?;
        let mut ep = iface.endpoint::<Bulk, In>(READ_EP).map_err(usb_err)?;

        let transfer_buf = nusb::transfer::Buffer::new(self.read_chunk);
        let completion = ep.transfer_blocking(transfer_buf, READ_TIMEOUT);
        completion.status.map_err(transfer_err)?;

        let raw_len = completion.actual_len;
        let raw = completion.buffer.into_vec();
        self.readbuf[..raw_len].copy_from_slice(&raw[..raw_len]);

        self.readbuf_off = 0;
        self.readbuf_len = strip_status_bytes(&mut self.readbuf[..raw_len], self.max_packet_size);
        Ok(())
    }
}

impl SerialTransport for UsbTransport {
    fn write(&mut self, data: &[u8]) -> LinkResult<usize> {
        let burst = data.len().min(self.write_chunk);
        let iface = self.iface()?;
        let mut ep = iface.endpoint::<Bulk, Out>(WRITE_EP).map_err(usb_err)?;

        let mut transfer_buf = nusb::transfer::Buffer::new(burst);
        transfer_buf.extend_from_slice(&data[..burst]);

        let completion = ep.transfer_blocking(transfer_buf, WRITE_TIMEOUT);
        completion.status.map_err(transfer_err)?;
        Ok(completion.actual_len)
    }

    fn read(&mut self, buf: &mut [u8]) -> LinkResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.readbuf_len == 0 {
            self.refill()?;
        }

        let n = self.readbuf_len.min(buf.len());
        buf[..n].copy_from_slice(&self.readbuf[self.readbuf_off..self.readbuf_off + n]);
        self.readbuf_off += n;
        self.readbuf_len -= n;
        Ok(n)
    }

    fn queued_bytes(&mut self) -> LinkResult<usize> {
        if self.readbuf_len == 0 {
            self.refill()?;
        }
        Ok(self.readbuf_len)
    }

    fn pulse_flow_signals(&mut self) -> LinkResult<()> {
        self.control_out(SIO_SET_MODEM_CTRL_REQUEST, SIO_SET_DTR_HIGH, USB_INDEX)?;
        self.control_out(SIO_SET_MODEM_CTRL_REQUEST, SIO_SET_RTS_LOW, USB_INDEX)
    }

    fn max_write_step(&self) -> usize {
        self.write_chunk
    }

    fn is_serial_port(&self) -> bool {
        false
    }

    fn close(&mut self) -> LinkResult<()> {
        // Dropping the handles releases the claim; nothing else to do.
        self.interface = None;
        self.device = None;
        self.readbuf_off = 0;
        self.readbuf_len = 0;
        Ok(())
    }
}

/// Compact a raw bulk read in place, dropping the 2-byte modem status header
/// the chip prepends to every `packet_size`-sized packet. Returns the number
/// of payload bytes kept at the front of `data`.
fn strip_status_bytes(data: &mut [u8], packet_size: usize) -> usize {
    let total = data.len();
    if total <= 2 {
        return 0;
    }

    let mut kept = 0;
    let mut pkt_start = 0;
    while pkt_start < total {
        let pkt_end = (pkt_start + packet_size).min(total);
        if pkt_end - pkt_start > 2 {
            let payload_len = pkt_end - pkt_start - 2;
            data.copy_within(pkt_start + 2..pkt_end, kept);
            kept += payload_len;
        }
        pkt_start = pkt_end;
    }
    kept
}

/// Bulk packet size for interface A, from the active configuration when
/// readable, otherwise 512 for high-speed (H-series) parts and 64 for the
/// full-speed ones.
fn probe_max_packet_size(device: &nusb::Device) -> usize {
    let bcd = device.device_descriptor().device_version();
    let fallback = match bcd {
        0x0700 | 0x0800 | 0x0900 => 512,
        _ => 64,
    };

    let Ok(config) = device.active_configuration() else {
        return fallback;
    };
    for group in config.interfaces() {
        if group.interface_number() != INTERFACE_NUM {
            continue;
        }
        for alt in group.alt_settings() {
            if let Some(ep) = alt.endpoints().next() {
                return ep.max_packet_size();
            }
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_single_packet() {
        let mut data = vec![0u8; 64];
        data[0] = 0x01;
        data[1] = 0x60;
        for (i, byte) in data.iter_mut().enumerate().skip(2) {
            *byte = i as u8;
        }

        assert_eq!(strip_status_bytes(&mut data, 64), 62);
        for (i, byte) in data.iter().enumerate().take(62) {
            assert_eq!(*byte, (i + 2) as u8);
        }
    }

    #[test]
    fn strip_two_packets_compacts_payload() {
        let mut data = vec![
            0xAA, 0xBB, 2, 3, 4, 5, 6, 7, // packet 1
            0xCC, 0xDD, 10, 11, 12, 13, 14, 15, // packet 2
        ];
        assert_eq!(strip_status_bytes(&mut data, 8), 12);
        assert_eq!(&data[..12], &[2, 3, 4, 5, 6, 7, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn strip_status_only_packet() {
        let mut data = vec![0x01, 0x60];
        assert_eq!(strip_status_bytes(&mut data, 64), 0);
    }

    #[test]
    fn strip_trailing_short_packet() {
        // Full packet followed by a status-only runt
        let mut data = vec![0xAA, 0xBB, 1, 2, 0xCC, 0xDD];
        assert_eq!(strip_status_bytes(&mut data, 4), 2);
        assert_eq!(&data[..2], &[1, 2]);
    }

    #[test]
    fn strip_empty() {
        let mut data: Vec<u8> = vec![];
        assert_eq!(strip_status_bytes(&mut data, 64), 0);
    }
}
