//! Network notification events.
//!
//! The payload that travels over the notification bus, as one exhaustively
//! matched sum type. The numeric kinds mirror the ABI event numbers so the
//! syscall layer can subscribe without seeing kernel types.

use exos_abi::net as abi;
use exos_lib::notification::EventKind;

use crate::net::types::{IpProtocol, Ipv4Addr, MacAddr};

/// Events published by the network stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetEvent {
    /// ARP learned (or relearned) the MAC for an address.
    ArpResolved { ip: Ipv4Addr, mac: MacAddr },
    /// ARP gave up resolving an address.
    ArpFailed { ip: Ipv4Addr },
    /// A TCP connection reached ESTABLISHED.
    TcpConnected,
    /// A TCP connection was aborted.
    TcpFailed,
    /// TCP delivered payload bytes to the receive buffer.
    TcpData { length: u32 },
    /// A queued IPv4 packet left the device after ARP resolution.
    Ipv4PacketSent {
        destination: Ipv4Addr,
        protocol: IpProtocol,
        payload_len: u32,
    },
}

impl EventKind for NetEvent {
    fn kind(&self) -> u32 {
        match self {
            Self::ArpResolved { .. } => abi::NOTIF_EVENT_ARP_RESOLVED,
            Self::ArpFailed { .. } => abi::NOTIF_EVENT_ARP_FAILED,
            Self::TcpConnected => abi::NOTIF_EVENT_TCP_CONNECTED,
            Self::TcpFailed => abi::NOTIF_EVENT_TCP_FAILED,
            Self::TcpData { .. } => abi::NOTIF_EVENT_TCP_DATA,
            Self::Ipv4PacketSent { .. } => abi::NOTIF_EVENT_IPV4_PACKET_SENT,
        }
    }
}
