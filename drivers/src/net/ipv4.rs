//! IPv4: header handling, routing, protocol dispatch, ARP-pending queue.
//!
//! Egress resolves the next hop through ARP. While resolution is in flight
//! the packet parks in a bounded per-device queue; the `ArpResolved`
//! notification flushes matching entries. Ingress validates hard (bad
//! packets are dropped and logged, never answered) and dispatches payloads
//! by protocol number.

use alloc::sync::Arc;
use alloc::vec::Vec;

use exos_lib::notification::{NotificationContext, NotifyCallback};
use exos_lib::{IrqMutex, klog_debug, klog_trace, klog_warn};

use crate::device::{ContextTag, Device, DeviceId, PCI_DEVICES};
use crate::net::arp::{self, ArpResolve};
use crate::net::checksum;
use crate::net::ethernet::{self, ETH_HEADER_LEN};
use crate::net::event::NetEvent;
use crate::net::types::{EtherType, IpProtocol, Ipv4Addr, MacAddr};

pub const IPV4_HEADER_LEN: usize = 20;
/// Pending-queue payload capacity (maximum Ethernet payload).
pub const IPV4_MAX_PAYLOAD: usize = 1500;
/// Packets parked per device while ARP resolves.
pub const IPV4_MAX_PENDING_PACKETS: usize = 16;

const FLAG_DONT_FRAGMENT: u16 = 0x4000;
const FLAG_MORE_FRAGMENTS: u16 = 0x2000;
const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;

const DEFAULT_TTL: u8 = 64;

// =============================================================================
// Wire format
// =============================================================================

/// Decoded 20-byte IPv4 header (options rejected by the IHL check).
#[derive(Clone, Copy, Debug)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < IPV4_HEADER_LEN {
            return None;
        }
        Some(Self {
            version: data[0] >> 4,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_length: u16::from_be_bytes([data[2], data[3]]),
            identification: u16::from_be_bytes([data[4], data[5]]),
            flags_fragment: u16::from_be_bytes([data[6], data[7]]),
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            source: Ipv4Addr([data[12], data[13], data[14], data[15]]),
            destination: Ipv4Addr([data[16], data[17], data[18], data[19]]),
        })
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.flags_fragment & FLAG_MORE_FRAGMENTS != 0
            || self.flags_fragment & FRAGMENT_OFFSET_MASK != 0
    }
}

/// Write a 20-byte header with a valid checksum into `out`.
pub fn write_header(
    out: &mut [u8],
    identification: u16,
    protocol: IpProtocol,
    source: Ipv4Addr,
    destination: Ipv4Addr,
    payload_len: usize,
) -> Option<usize> {
    if out.len() < IPV4_HEADER_LEN {
        return None;
    }
    let total_length = (IPV4_HEADER_LEN + payload_len) as u16;

    out[0] = 0x45; // version 4, IHL 5
    out[1] = 0;
    out[2..4].copy_from_slice(&total_length.to_be_bytes());
    out[4..6].copy_from_slice(&identification.to_be_bytes());
    out[6..8].copy_from_slice(&FLAG_DONT_FRAGMENT.to_be_bytes());
    out[8] = DEFAULT_TTL;
    out[9] = protocol.as_u8();
    out[10..12].fill(0);
    out[12..16].copy_from_slice(&source.0);
    out[16..20].copy_from_slice(&destination.0);

    let sum = checksum::checksum(&out[..IPV4_HEADER_LEN]);
    out[10..12].copy_from_slice(&sum.to_be_bytes());
    Some(IPV4_HEADER_LEN)
}

// =============================================================================
// Per-device context
// =============================================================================

/// Outcome of [`Ipv4Context::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ipv4SendStatus {
    /// The frame left the device.
    Immediate,
    /// Parked until ARP resolves the next hop.
    Pending,
    /// Not sent: no route, resolution failed, or the queue is full.
    Failed,
}

/// Protocol handler: device, payload, addresses from the header.
pub type ProtocolHandler = fn(&Arc<Device>, &[u8], Ipv4Addr, Ipv4Addr);

struct PendingPacket {
    destination: Ipv4Addr,
    next_hop: Ipv4Addr,
    protocol: IpProtocol,
    payload: [u8; IPV4_MAX_PAYLOAD],
    length: usize,
    valid: bool,
}

impl PendingPacket {
    const EMPTY: Self = Self {
        destination: Ipv4Addr::UNSPECIFIED,
        next_hop: Ipv4Addr::UNSPECIFIED,
        protocol: IpProtocol::Udp,
        payload: [0; IPV4_MAX_PAYLOAD],
        length: 0,
        valid: false,
    };
}

struct Ipv4Inner {
    local: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Ipv4Addr,
    identification: u16,
    arp_callback_registered: bool,
    pending: [PendingPacket; IPV4_MAX_PENDING_PACKETS],
}

/// Per-device IPv4 state.
pub struct Ipv4Context {
    device_id: DeviceId,
    inner: IrqMutex<Ipv4Inner>,
    handlers: IrqMutex<[Option<ProtocolHandler>; 256]>,
    notifications: IrqMutex<NotificationContext<NetEvent>>,
}

/// Fetch or create the IPv4 context of a device.
pub fn ipv4_context(device: &Arc<Device>) -> Arc<Ipv4Context> {
    device.get_or_create_context(ContextTag::Ipv4, || {
        Arc::new(Ipv4Context::new(device.id()))
    })
}

/// Bind the IPv4 layer to a device with its address plan, wiring ARP with
/// the same local address.
pub fn ipv4_initialize(
    device: &Arc<Device>,
    local: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Ipv4Addr,
) -> Arc<Ipv4Context> {
    let context = ipv4_context(device);
    context.configure(local, netmask, gateway);
    arp::arp_initialize(device, local);
    context
}

impl Ipv4Context {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            inner: IrqMutex::new(Ipv4Inner {
                local: Ipv4Addr::UNSPECIFIED,
                netmask: Ipv4Addr::UNSPECIFIED,
                gateway: Ipv4Addr::UNSPECIFIED,
                identification: 0,
                arp_callback_registered: false,
                pending: [const { PendingPacket::EMPTY }; IPV4_MAX_PENDING_PACKETS],
            }),
            handlers: IrqMutex::new([None; 256]),
            notifications: IrqMutex::new(NotificationContext::new()),
        }
    }

    pub fn configure(&self, local: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) {
        let mut inner = self.inner.lock();
        inner.local = local;
        inner.netmask = netmask;
        inner.gateway = gateway;
    }

    pub fn local_address(&self) -> Ipv4Addr {
        self.inner.lock().local
    }

    /// Install the handler for an IP protocol number.
    pub fn register_protocol(&self, protocol: IpProtocol, handler: ProtocolHandler) {
        self.handlers.lock()[protocol.as_u8() as usize] = Some(handler);
    }

    pub fn unregister_protocol(&self, protocol: IpProtocol) {
        self.handlers.lock()[protocol.as_u8() as usize] = None;
    }

    pub fn register_notification(
        &self,
        kind: u32,
        callback: NotifyCallback<NetEvent>,
        user_data: usize,
    ) -> bool {
        self.notifications.lock().register(kind, callback, user_data)
    }

    pub fn unregister_notification(
        &self,
        kind: u32,
        callback: NotifyCallback<NetEvent>,
        user_data: usize,
    ) -> bool {
        self.notifications.lock().unregister(kind, callback, user_data)
    }

    /// Monotonic identification: 1 ..= 0xFFFF, skipping 0 on wrap.
    fn next_identification(inner: &mut Ipv4Inner) -> u16 {
        inner.identification = if inner.identification == 0xFFFF {
            1
        } else {
            inner.identification + 1
        };
        inner.identification
    }

    /// Route selection: off-subnet destinations go to the gateway when one
    /// is configured.
    fn select_next_hop(inner: &Ipv4Inner, destination: Ipv4Addr) -> Ipv4Addr {
        if !destination.same_subnet(inner.local, inner.netmask)
            && !inner.gateway.is_unspecified()
        {
            inner.gateway
        } else {
            destination
        }
    }

    // -------------------------------------------------------------------------
    // Egress
    // -------------------------------------------------------------------------

    /// Send `payload` as one IPv4 packet to `destination`.
    pub fn send(
        &self,
        device: &Arc<Device>,
        destination: Ipv4Addr,
        protocol: IpProtocol,
        payload: &[u8],
    ) -> Ipv4SendStatus {
        if payload.len() > IPV4_MAX_PAYLOAD {
            return Ipv4SendStatus::Failed;
        }

        let next_hop = Self::select_next_hop(&self.inner.lock(), destination);

        match arp::arp_context(device).resolve(device, next_hop) {
            ArpResolve::Resolved(mac) => {
                if self.transmit(device, mac, destination, protocol, payload) {
                    Ipv4SendStatus::Immediate
                } else {
                    Ipv4SendStatus::Failed
                }
            }
            ArpResolve::Pending => self.enqueue_pending(device, destination, next_hop, protocol, payload),
            ArpResolve::Failed => Ipv4SendStatus::Failed,
        }
    }

    /// Park a packet until `next_hop` resolves.
    fn enqueue_pending(
        &self,
        device: &Arc<Device>,
        destination: Ipv4Addr,
        next_hop: Ipv4Addr,
        protocol: IpProtocol,
        payload: &[u8],
    ) -> Ipv4SendStatus {
        // Register the flush listener before taking our own lock: the ARP
        // side dispatches notifications into this context, so the lock
        // order must stay arp-then-ipv4. Registration is idempotent; the
        // latch only saves the lookup.
        let registered = self.inner.lock().arp_callback_registered;
        if !registered {
            arp::arp_context(device).register_notification(
                exos_abi::net::NOTIF_EVENT_ARP_RESOLVED,
                arp_resolved_listener,
                self.device_id.0 as usize,
            );
            self.inner.lock().arp_callback_registered = true;
        }

        let mut inner = self.inner.lock();

        let Some(slot) = inner.pending.iter_mut().find(|slot| !slot.valid) else {
            klog_warn!("ipv4: pending queue full, dropping packet to {}", destination);
            return Ipv4SendStatus::Failed;
        };

        slot.destination = destination;
        slot.next_hop = next_hop;
        slot.protocol = protocol;
        slot.payload[..payload.len()].copy_from_slice(payload);
        slot.length = payload.len();
        slot.valid = true;

        klog_trace!("ipv4: queued {} bytes for {} via {}", payload.len(), destination, next_hop);
        Ipv4SendStatus::Pending
    }

    /// Frame assembly and the actual driver transmit.
    fn transmit(
        &self,
        device: &Arc<Device>,
        destination_mac: MacAddr,
        destination: Ipv4Addr,
        protocol: IpProtocol,
        payload: &[u8],
    ) -> bool {
        let Some(net) = device.network() else {
            klog_warn!("ipv4: device {} has no network driver", self.device_id);
            return false;
        };
        let info = net.info();

        let (local, identification) = {
            let mut inner = self.inner.lock();
            (inner.local, Self::next_identification(&mut inner))
        };

        let mut frame = alloc::vec![0u8; ETH_HEADER_LEN + IPV4_HEADER_LEN + payload.len()];
        let header = ethernet::EthernetHeader {
            destination: destination_mac,
            source: info.mac,
            ethertype: EtherType::Ipv4.as_u16(),
        };
        if header.write(&mut frame).is_none() {
            return false;
        }
        if write_header(
            &mut frame[ETH_HEADER_LEN..],
            identification,
            protocol,
            local,
            destination,
            payload.len(),
        )
        .is_none()
        {
            return false;
        }
        frame[ETH_HEADER_LEN + IPV4_HEADER_LEN..].copy_from_slice(payload);

        match net.send(&frame) {
            Ok(()) => true,
            Err(err) => {
                klog_warn!("ipv4: transmit to {} failed: {}", destination, err);
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Pending flush
    // -------------------------------------------------------------------------

    /// ARP resolved `ip`: send every queued packet routed through it.
    pub fn flush_pending(&self, device: &Arc<Device>, ip: Ipv4Addr) {
        struct Ready {
            destination: Ipv4Addr,
            protocol: IpProtocol,
            payload: [u8; IPV4_MAX_PAYLOAD],
            length: usize,
        }

        let mut ready: Vec<Ready> = Vec::new();
        {
            let mut inner = self.inner.lock();
            for slot in inner.pending.iter_mut() {
                if slot.valid && slot.next_hop == ip {
                    ready.push(Ready {
                        destination: slot.destination,
                        protocol: slot.protocol,
                        payload: slot.payload,
                        length: slot.length,
                    });
                    slot.valid = false;
                }
            }
        }

        if ready.is_empty() {
            return;
        }

        // The entry may have expired between the notification and now:
        // verify once more and send directly, skipping re-resolution.
        let arp = arp::arp_context(device);
        for packet in &ready {
            let ArpResolve::Resolved(mac) = arp.resolve(device, ip) else {
                klog_debug!("ipv4: {} expired before flush, dropping", ip);
                continue;
            };
            if self.transmit(
                device,
                mac,
                packet.destination,
                packet.protocol,
                &packet.payload[..packet.length],
            ) {
                let event = NetEvent::Ipv4PacketSent {
                    destination: packet.destination,
                    protocol: packet.protocol,
                    payload_len: packet.length as u32,
                };
                self.notifications.lock().send(&event);
            }
        }
    }

    /// Number of parked packets (diagnostic).
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.iter().filter(|slot| slot.valid).count()
    }

    // -------------------------------------------------------------------------
    // Ingress
    // -------------------------------------------------------------------------

    /// Validate one received packet and dispatch its payload.
    pub fn on_packet(&self, device: &Arc<Device>, data: &[u8]) {
        let Some(header) = Ipv4Header::parse(data) else {
            klog_trace!("ipv4: truncated header dropped");
            return;
        };

        if header.version != 4 {
            klog_trace!("ipv4: version {} dropped", header.version);
            return;
        }
        let total = header.total_length as usize;
        if header.ihl < 5 || header.header_len() > total {
            klog_trace!("ipv4: bad ihl {} dropped", header.ihl);
            return;
        }
        if total > data.len() {
            klog_trace!("ipv4: total {} exceeds frame {} dropped", total, data.len());
            return;
        }
        if !checksum::verify(&data[..header.header_len()]) {
            klog_trace!("ipv4: header checksum mismatch dropped");
            return;
        }
        if header.ttl <= 1 {
            klog_trace!("ipv4: ttl expired dropped");
            return;
        }
        if header.is_fragment() {
            klog_trace!("ipv4: fragment dropped (reassembly unsupported)");
            return;
        }

        let local = self.inner.lock().local;
        if header.destination != local && !header.destination.is_broadcast() {
            return;
        }

        let handler = self.handlers.lock()[header.protocol as usize];
        let Some(handler) = handler else {
            klog_trace!("ipv4: no handler for protocol {}", header.protocol);
            return;
        };

        let payload = &data[header.header_len()..total];
        handler(device, payload, header.source, header.destination);
    }
}

/// ArpResolved listener registered (lazily) on the device's ARP context.
fn arp_resolved_listener(event: &NetEvent, user_data: usize) {
    let NetEvent::ArpResolved { ip, .. } = event else {
        return;
    };
    let device_id = DeviceId(user_data as u32);
    let Some(device) = PCI_DEVICES.by_id(device_id) else {
        return;
    };
    ipv4_context(&device).flush_pending(&device, *ip);
}

/// Ethernet-level ingress: strip the frame header, hand the datagram to the
/// device's context.
pub fn on_ethernet_frame(device: &Arc<Device>, frame: &[u8]) {
    if frame.len() <= ETH_HEADER_LEN {
        return;
    }
    ipv4_context(device).on_packet(device, &frame[ETH_HEADER_LEN..]);
}
