//! Address Resolution Protocol.
//!
//! Each network device carries a 32-slot ARP cache in its context map.
//! Resolution is asynchronous: a miss broadcasts a request, marks the entry
//! probing, and reports pending; the periodic tick drives retransmission
//! through the entry's adaptive-delay state until the reply lands or the
//! attempt budget runs out.
//!
//! Locking: the cache lock is released before any notification is
//! dispatched, because listeners (the IPv4 pending-queue flush) re-enter this
//! module. Driver transmits are ordered strictly after the cache lock.

use alloc::sync::Arc;
use alloc::vec::Vec;

use exos_lib::notification::{NotificationContext, NotifyCallback};
use exos_lib::{AdaptiveDelay, IrqMutex, klog_debug, klog_trace, klog_warn};

use crate::device::{ContextTag, Device, DeviceId};
use crate::net::ethernet::{self, ETH_HEADER_LEN};
use crate::net::event::NetEvent;
use crate::net::types::{EtherType, Ipv4Addr, MacAddr};

/// Cache slots per device.
pub const ARP_CACHE_SIZE: usize = 32;
/// Resolved-entry lifetime in ticks (~10 minutes at a 1 Hz tick).
pub const ARP_ENTRY_TTL_TICKS: u32 = 600;
/// Ticks between the initial request and the first retry.
pub const ARP_PROBE_INTERVAL_TICKS: u32 = 3;

pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

const ARP_HTYPE_ETHERNET: u16 = 1;
const ARP_PTYPE_IPV4: u16 = 0x0800;
const ARP_HLEN_ETHERNET: u8 = 6;
const ARP_PLEN_IPV4: u8 = 4;

/// Wire size of an ARP packet for Ethernet/IPv4.
pub const ARP_PACKET_LEN: usize = 28;

// =============================================================================
// Wire format
// =============================================================================

/// Decoded ARP packet.
#[derive(Clone, Copy, Debug)]
pub struct ArpPacket {
    pub htype: u16,
    pub ptype: u16,
    pub hlen: u8,
    pub plen: u8,
    pub op: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Build a request or reply originating from `sender`.
    pub fn new(
        op: u16,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            htype: ARP_HTYPE_ETHERNET,
            ptype: ARP_PTYPE_IPV4,
            hlen: ARP_HLEN_ETHERNET,
            plen: ARP_PLEN_IPV4,
            op,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_PACKET_LEN {
            return None;
        }
        let mut sender_mac = [0u8; 6];
        let mut target_mac = [0u8; 6];
        sender_mac.copy_from_slice(&data[8..14]);
        target_mac.copy_from_slice(&data[18..24]);
        Some(Self {
            htype: u16::from_be_bytes([data[0], data[1]]),
            ptype: u16::from_be_bytes([data[2], data[3]]),
            hlen: data[4],
            plen: data[5],
            op: u16::from_be_bytes([data[6], data[7]]),
            sender_mac: MacAddr(sender_mac),
            sender_ip: Ipv4Addr([data[14], data[15], data[16], data[17]]),
            target_mac: MacAddr(target_mac),
            target_ip: Ipv4Addr([data[24], data[25], data[26], data[27]]),
        })
    }

    pub fn write(&self, out: &mut [u8]) -> Option<usize> {
        if out.len() < ARP_PACKET_LEN {
            return None;
        }
        out[0..2].copy_from_slice(&self.htype.to_be_bytes());
        out[2..4].copy_from_slice(&self.ptype.to_be_bytes());
        out[4] = self.hlen;
        out[5] = self.plen;
        out[6..8].copy_from_slice(&self.op.to_be_bytes());
        out[8..14].copy_from_slice(&self.sender_mac.0);
        out[14..18].copy_from_slice(&self.sender_ip.0);
        out[18..24].copy_from_slice(&self.target_mac.0);
        out[24..28].copy_from_slice(&self.target_ip.0);
        Some(ARP_PACKET_LEN)
    }

    /// Field validation for ingress packets.
    pub fn is_well_formed(&self) -> bool {
        self.htype == ARP_HTYPE_ETHERNET
            && self.ptype == ARP_PTYPE_IPV4
            && self.hlen == ARP_HLEN_ETHERNET
            && self.plen == ARP_PLEN_IPV4
            && (self.op == ARP_OP_REQUEST || self.op == ARP_OP_REPLY)
    }
}

// =============================================================================
// Cache
// =============================================================================

#[derive(Clone, Copy)]
struct ArpCacheEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    ttl: u32,
    valid: bool,
    probing: bool,
    delay: AdaptiveDelay,
}

impl ArpCacheEntry {
    const EMPTY: Self = Self {
        ip: Ipv4Addr::UNSPECIFIED,
        mac: MacAddr::ZERO,
        ttl: 0,
        valid: false,
        probing: false,
        delay: AdaptiveDelay::new(),
    };

    fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    fn in_use(&self) -> bool {
        self.valid || self.probing
    }
}

struct ArpInner {
    local_mac: MacAddr,
    local_ip: Ipv4Addr,
    entries: [ArpCacheEntry; ARP_CACHE_SIZE],
}

/// Outcome of [`ArpContext::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArpResolve {
    /// The MAC is known.
    Resolved(MacAddr),
    /// A request is in flight; retry after the probe interval.
    Pending,
    /// Unresolvable (unspecified address, or the retry budget ran out).
    Failed,
}

/// Per-device ARP state.
pub struct ArpContext {
    device_id: DeviceId,
    inner: IrqMutex<ArpInner>,
    notifications: IrqMutex<NotificationContext<NetEvent>>,
}

/// Fetch or create the ARP context of a device.
pub fn arp_context(device: &Arc<Device>) -> Arc<ArpContext> {
    device.get_or_create_context(ContextTag::Arp, || {
        let mac = device
            .network()
            .map(|net| net.info().mac)
            .unwrap_or(MacAddr::ZERO);
        Arc::new(ArpContext::new(device.id(), mac))
    })
}

/// Bind the ARP layer to a device with its local IPv4 address.
pub fn arp_initialize(device: &Arc<Device>, local_ip: Ipv4Addr) -> Arc<ArpContext> {
    let context = arp_context(device);
    context.set_local_address(local_ip);
    context
}

impl ArpContext {
    pub fn new(device_id: DeviceId, local_mac: MacAddr) -> Self {
        Self {
            device_id,
            inner: IrqMutex::new(ArpInner {
                local_mac,
                local_ip: Ipv4Addr::UNSPECIFIED,
                entries: [ArpCacheEntry::EMPTY; ARP_CACHE_SIZE],
            }),
            notifications: IrqMutex::new(NotificationContext::new()),
        }
    }

    #[inline]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Rebind the local address after (re)configuration.
    pub fn set_local_address(&self, local_ip: Ipv4Addr) {
        self.inner.lock().local_ip = local_ip;
    }

    pub fn local_address(&self) -> Ipv4Addr {
        self.inner.lock().local_ip
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

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

    fn dispatch(&self, events: &[NetEvent]) {
        if events.is_empty() {
            return;
        }
        let notifications = self.notifications.lock();
        for event in events {
            notifications.send(event);
        }
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Resolve `target` to a MAC address.
    ///
    /// Broadcast resolves synchronously; the unspecified address fails. A
    /// cache hit returns the MAC. Otherwise an entry is (re)used and the
    /// probe machinery decides between `Pending` and giving up.
    pub fn resolve(&self, device: &Arc<Device>, target: Ipv4Addr) -> ArpResolve {
        if target.is_broadcast() {
            return ArpResolve::Resolved(MacAddr::BROADCAST);
        }
        if target.is_unspecified() {
            return ArpResolve::Failed;
        }

        let mut request = None;
        let mut events: Vec<NetEvent> = Vec::new();
        let result;
        {
            let mut inner = self.inner.lock();
            let local_mac = inner.local_mac;
            let local_ip = inner.local_ip;

            let index = match Self::lookup(&inner.entries, target) {
                Some(index) => index,
                None => {
                    let index = Self::allocate_slot(&mut inner.entries);
                    let entry = &mut inner.entries[index];
                    entry.clear();
                    entry.ip = target;
                    index
                }
            };

            let entry = &mut inner.entries[index];
            if entry.valid {
                return ArpResolve::Resolved(entry.mac);
            }

            if !entry.probing {
                entry.probing = true;
                entry.ttl = ARP_PROBE_INTERVAL_TICKS;
                entry.delay.get_next_delay();
                request = Some((local_mac, local_ip, target));
                result = ArpResolve::Pending;
            } else if entry.delay.should_continue() {
                entry.ttl = entry.delay.get_next_delay();
                result = ArpResolve::Pending;
            } else {
                entry.probing = false;
                entry.delay.reset();
                events.push(NetEvent::ArpFailed { ip: target });
                result = ArpResolve::Failed;
            }
        }

        if let Some((local_mac, local_ip, target)) = request {
            self.transmit_request(device, local_mac, local_ip, target);
        }
        self.dispatch(&events);
        result
    }

    /// Periodic 1 Hz maintenance: age valid entries, drive probe retries.
    pub fn tick(&self, device: &Arc<Device>) {
        let mut requests: Vec<Ipv4Addr> = Vec::new();
        let mut events: Vec<NetEvent> = Vec::new();
        let local_mac;
        let local_ip;
        {
            let mut inner = self.inner.lock();
            local_mac = inner.local_mac;
            local_ip = inner.local_ip;

            for entry in inner.entries.iter_mut() {
                if entry.valid && entry.ttl > 0 {
                    entry.ttl -= 1;
                    if entry.ttl == 0 {
                        klog_trace!("arp: entry {} expired", entry.ip);
                        entry.clear();
                        continue;
                    }
                }

                if entry.probing && !entry.valid && entry.ttl > 0 {
                    entry.ttl -= 1;
                    if entry.ttl == 0 {
                        if entry.delay.should_continue() {
                            requests.push(entry.ip);
                            entry.ttl = entry.delay.get_next_delay();
                        } else {
                            klog_debug!("arp: giving up on {}", entry.ip);
                            events.push(NetEvent::ArpFailed { ip: entry.ip });
                            entry.probing = false;
                            entry.delay.reset();
                        }
                    }
                }
            }
        }

        for target in requests {
            self.transmit_request(device, local_mac, local_ip, target);
        }
        self.dispatch(&events);
    }

    // -------------------------------------------------------------------------
    // Ingress
    // -------------------------------------------------------------------------

    /// Handle a validated ARP packet: learn the sender, answer requests for
    /// the local address.
    pub fn handle_packet(&self, device: &Arc<Device>, packet: &ArpPacket) {
        if !packet.is_well_formed() {
            klog_trace!("arp: malformed packet dropped");
            return;
        }
        if !packet.sender_mac.is_valid_unicast() {
            klog_trace!("arp: invalid sender mac {} dropped", packet.sender_mac);
            return;
        }
        if packet.sender_ip.is_unspecified() {
            return;
        }

        let mut reply = None;
        let mut events: Vec<NetEvent> = Vec::new();
        {
            let mut inner = self.inner.lock();
            let local_mac = inner.local_mac;
            let local_ip = inner.local_ip;

            let index = match Self::lookup(&inner.entries, packet.sender_ip) {
                Some(index) => index,
                None => {
                    let index = Self::allocate_slot(&mut inner.entries);
                    inner.entries[index].clear();
                    inner.entries[index].ip = packet.sender_ip;
                    index
                }
            };

            let entry = &mut inner.entries[index];
            let was_probing = entry.probing;
            let mac_changed = entry.valid && entry.mac != packet.sender_mac;

            entry.mac = packet.sender_mac;
            entry.valid = true;
            entry.probing = false;
            entry.ttl = ARP_ENTRY_TTL_TICKS;
            entry.delay.on_success();

            if was_probing || mac_changed {
                events.push(NetEvent::ArpResolved {
                    ip: packet.sender_ip,
                    mac: packet.sender_mac,
                });
            }

            if packet.op == ARP_OP_REQUEST
                && !local_ip.is_unspecified()
                && packet.target_ip == local_ip
            {
                reply = Some((local_mac, local_ip, packet.sender_mac, packet.sender_ip));
            }
        }

        if let Some((local_mac, local_ip, target_mac, target_ip)) = reply {
            self.transmit_reply(device, local_mac, local_ip, target_mac, target_ip);
        }
        self.dispatch(&events);
    }

    /// Ethernet-level entry point: length check, decode, handle.
    pub fn on_frame(&self, device: &Arc<Device>, frame: &[u8]) {
        if frame.len() < ETH_HEADER_LEN + ARP_PACKET_LEN {
            klog_trace!("arp: short frame ({} bytes) dropped", frame.len());
            return;
        }
        if let Some(packet) = ArpPacket::parse(&frame[ETH_HEADER_LEN..]) {
            self.handle_packet(device, &packet);
        }
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Log every live cache entry.
    pub fn dump_cache(&self) {
        let inner = self.inner.lock();
        for entry in inner.entries.iter().filter(|e| e.in_use()) {
            klog_debug!(
                "arp: {} -> {} ttl={} valid={} probing={}",
                entry.ip,
                entry.mac,
                entry.ttl,
                entry.valid,
                entry.probing
            );
        }
    }

    /// Number of entries holding a resolved address.
    pub fn valid_entries(&self) -> usize {
        self.inner.lock().entries.iter().filter(|e| e.valid).count()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lookup(entries: &[ArpCacheEntry; ARP_CACHE_SIZE], ip: Ipv4Addr) -> Option<usize> {
        entries
            .iter()
            .position(|entry| entry.in_use() && entry.ip == ip)
    }

    /// Pick a slot: first unused, else the smallest-TTL victim.
    fn allocate_slot(entries: &mut [ArpCacheEntry; ARP_CACHE_SIZE]) -> usize {
        if let Some(index) = entries.iter().position(|entry| !entry.in_use()) {
            return index;
        }
        let mut victim = 0;
        for (index, entry) in entries.iter().enumerate() {
            if entry.ttl < entries[victim].ttl {
                victim = index;
            }
        }
        victim
    }

    fn transmit(&self, device: &Arc<Device>, destination: MacAddr, packet: &ArpPacket) {
        let Some(net) = device.network() else {
            klog_warn!("arp: device {} has no network driver", self.device_id);
            return;
        };

        let mut frame = [0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
        let mut payload = [0u8; ARP_PACKET_LEN];
        let _ = packet.write(&mut payload);
        let Some(len) = ethernet::build_frame(
            &mut frame,
            destination,
            packet.sender_mac,
            EtherType::Arp,
            &payload,
        ) else {
            return;
        };

        if let Err(err) = net.send(&frame[..len]) {
            klog_warn!("arp: transmit failed: {}", err);
        }
    }

    fn transmit_request(
        &self,
        device: &Arc<Device>,
        local_mac: MacAddr,
        local_ip: Ipv4Addr,
        target: Ipv4Addr,
    ) {
        klog_trace!("arp: who-has {} tell {}", target, local_ip);
        let packet = ArpPacket::new(ARP_OP_REQUEST, local_mac, local_ip, MacAddr::ZERO, target);
        self.transmit(device, MacAddr::BROADCAST, &packet);
    }

    fn transmit_reply(
        &self,
        device: &Arc<Device>,
        local_mac: MacAddr,
        local_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) {
        klog_trace!("arp: {} is-at {}", local_ip, local_mac);
        let packet = ArpPacket::new(ARP_OP_REPLY, local_mac, local_ip, target_mac, target_ip);
        self.transmit(device, target_mac, &packet);
    }
}

/// Module-level ingress hook used by the Ethernet demultiplex.
pub fn on_ethernet_frame(device: &Arc<Device>, frame: &[u8]) {
    arp_context(device).on_frame(device, frame);
}
