//! Network ABI constants.
//!
//! Event IDs mirror the kernel-internal notification enum one-to-one so the
//! syscall layer can expose subscriptions without leaking kernel types.

/// ARP resolution completed for an address.
pub const NOTIF_EVENT_ARP_RESOLVED: u32 = 0x0000_0001;
/// ARP resolution gave up after the retry budget.
pub const NOTIF_EVENT_ARP_FAILED: u32 = 0x0000_0002;
/// A TCP connection reached ESTABLISHED.
pub const NOTIF_EVENT_TCP_CONNECTED: u32 = 0x0000_0003;
/// A TCP connection was aborted (retransmission exhausted or reset).
pub const NOTIF_EVENT_TCP_FAILED: u32 = 0x0000_0004;
/// TCP payload bytes were delivered to the receive buffer.
pub const NOTIF_EVENT_TCP_DATA: u32 = 0x0000_0005;
/// A queued IPv4 packet left the device after ARP resolution.
pub const NOTIF_EVENT_IPV4_PACKET_SENT: u32 = 0x0000_0006;
