//! Ethernet II framing and the per-device receive demultiplex.

use alloc::sync::Arc;

use exos_lib::klog_trace;

use crate::device::{Device, DeviceId, PCI_DEVICES};
use crate::net::types::{EtherType, MacAddr};

/// Ethernet II header length.
pub const ETH_HEADER_LEN: usize = 14;

/// Parsed Ethernet II header.
#[derive(Clone, Copy, Debug)]
pub struct EthernetHeader {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Parse the first 14 bytes of a frame.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < ETH_HEADER_LEN {
            return None;
        }
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&frame[0..6]);
        source.copy_from_slice(&frame[6..12]);
        Some(Self {
            destination: MacAddr(destination),
            source: MacAddr(source),
            ethertype: u16::from_be_bytes([frame[12], frame[13]]),
        })
    }

    /// Write the header into `out[..14]`.
    pub fn write(&self, out: &mut [u8]) -> Option<usize> {
        if out.len() < ETH_HEADER_LEN {
            return None;
        }
        out[0..6].copy_from_slice(&self.destination.0);
        out[6..12].copy_from_slice(&self.source.0);
        out[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        Some(ETH_HEADER_LEN)
    }
}

/// Build a frame: header plus payload, into `out`. Returns the frame length.
pub fn build_frame(
    out: &mut [u8],
    destination: MacAddr,
    source: MacAddr,
    ethertype: EtherType,
    payload: &[u8],
) -> Option<usize> {
    let total = ETH_HEADER_LEN + payload.len();
    if out.len() < total {
        return None;
    }
    EthernetHeader {
        destination,
        source,
        ethertype: ethertype.as_u16(),
    }
    .write(out)?;
    out[ETH_HEADER_LEN..total].copy_from_slice(payload);
    Some(total)
}

/// Receive callback registered with every bound NIC: demultiplex one frame
/// by EtherType into ARP or IPv4.
pub fn rx_dispatch(device_id: DeviceId, frame: &[u8], _user_data: usize) {
    let Some(device) = PCI_DEVICES.by_id(device_id) else {
        return;
    };
    dispatch_frame(&device, frame);
}

/// Demultiplex path shared by the RX callback and the tests.
pub fn dispatch_frame(device: &Arc<Device>, frame: &[u8]) {
    let Some(header) = EthernetHeader::parse(frame) else {
        klog_trace!("eth: runt frame ({} bytes) dropped", frame.len());
        return;
    };

    match EtherType::from_u16(header.ethertype) {
        Some(EtherType::Arp) => crate::net::arp::on_ethernet_frame(device, frame),
        Some(EtherType::Ipv4) => crate::net::ipv4::on_ethernet_frame(device, frame),
        None => {
            klog_trace!(
                "eth: unhandled ethertype {:04x} from {}",
                header.ethertype,
                header.source
            );
        }
    }
}
