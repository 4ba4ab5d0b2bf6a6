//! ARP regression tests: cache behavior, probing, ingress validation,
//! request/reply handling, notifications.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use exos_abi::net::NOTIF_EVENT_ARP_RESOLVED;
use exos_lib::testing::{TestResult, TestSuiteDesc};
use exos_lib::{assert_eq_test, assert_test, pass, run_test};

use crate::device::Device;
use crate::net::arp::{
    self, ARP_OP_REPLY, ARP_OP_REQUEST, ARP_PACKET_LEN, ArpPacket, ArpResolve,
};
use crate::net::ethernet::{self, ETH_HEADER_LEN};
use crate::net::event::NetEvent;
use crate::net::ipv4;
use crate::net::types::{EtherType, Ipv4Addr, MacAddr};
use crate::test_fixtures::{self as fixtures, TEST_NIC_MAC, TestNic};

const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
const NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

fn setup() -> (Arc<Device>, Arc<TestNic>) {
    fixtures::reset_stack();
    let (device, nic) = fixtures::make_net_device();
    ipv4::ipv4_initialize(&device, LOCAL_IP, NETMASK, Ipv4Addr::UNSPECIFIED);
    (device, nic)
}

fn build_arp_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let packet = ArpPacket::new(ARP_OP_REQUEST, sender_mac, sender_ip, MacAddr::ZERO, target_ip);
    let mut payload = [0u8; ARP_PACKET_LEN];
    let _ = packet.write(&mut payload);
    let mut frame = alloc::vec![0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
    let _ = ethernet::build_frame(
        &mut frame,
        MacAddr::BROADCAST,
        sender_mac,
        EtherType::Arp,
        &payload,
    );
    frame
}

// =============================================================================
// Notification capture
// =============================================================================

static RESOLVED_HITS: AtomicU32 = AtomicU32::new(0);

fn capture_resolved(event: &NetEvent, _user_data: usize) {
    if let NetEvent::ArpResolved { ip, mac } = event {
        if *ip == GATEWAY_IP && *mac == MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]) {
            RESOLVED_HITS.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

/// Resolution from a warm cache is synchronous and silent on the wire.
pub fn test_resolve_immediate_from_cache() -> TestResult {
    let (device, nic) = setup();
    let peer_mac = MacAddr([0x52, 0x54, 0x00, 0xAA, 0xBB, 0xCC]);

    fixtures::inject_frame(
        &device,
        &fixtures::build_arp_reply(peer_mac, GATEWAY_IP, TEST_NIC_MAC, LOCAL_IP),
    );

    let result = arp::arp_context(&device).resolve(&device, GATEWAY_IP);
    assert_eq_test!(result, ArpResolve::Resolved(peer_mac), "cache hit");
    assert_eq_test!(nic.sent_count(), 0, "no frame emitted for a cache hit");
    pass!()
}

/// A cold resolve broadcasts one request and reports pending; the reply
/// fires the resolved notification.
pub fn test_resolve_pending_then_resolved() -> TestResult {
    let (device, nic) = setup();
    let context = arp::arp_context(&device);

    assert_eq_test!(
        context.resolve(&device, GATEWAY_IP),
        ArpResolve::Pending,
        "cold cache is pending"
    );

    let frames = nic.take_frames();
    assert_eq_test!(frames.len(), 1, "exactly one request on the wire");
    let frame = &frames[0];
    let header = match ethernet::EthernetHeader::parse(frame) {
        Some(header) => header,
        None => return exos_lib::fail!("request frame did not parse"),
    };
    assert_test!(header.destination.is_broadcast(), "request is broadcast");
    assert_eq_test!(header.ethertype, 0x0806, "ethertype is ARP");

    let packet = match ArpPacket::parse(&frame[ETH_HEADER_LEN..]) {
        Some(packet) => packet,
        None => return exos_lib::fail!("request did not parse"),
    };
    assert_eq_test!(packet.op, ARP_OP_REQUEST, "opcode");
    assert_eq_test!(packet.target_ip, GATEWAY_IP, "probe target");
    assert_eq_test!(packet.sender_ip, LOCAL_IP, "probe sender");

    RESOLVED_HITS.store(0, Ordering::Relaxed);
    context.register_notification(NOTIF_EVENT_ARP_RESOLVED, capture_resolved, 0);

    let peer_mac = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    fixtures::inject_frame(
        &device,
        &fixtures::build_arp_reply(peer_mac, GATEWAY_IP, TEST_NIC_MAC, LOCAL_IP),
    );

    assert_eq_test!(RESOLVED_HITS.load(Ordering::Relaxed), 1, "resolved notification fired");
    assert_eq_test!(
        context.resolve(&device, GATEWAY_IP),
        ArpResolve::Resolved(peer_mac),
        "now resolved"
    );
    pass!()
}

pub fn test_resolve_special_addresses() -> TestResult {
    let (device, nic) = setup();
    let context = arp::arp_context(&device);

    assert_eq_test!(
        context.resolve(&device, Ipv4Addr::BROADCAST),
        ArpResolve::Resolved(MacAddr::BROADCAST),
        "broadcast resolves synchronously"
    );
    assert_eq_test!(
        context.resolve(&device, Ipv4Addr::UNSPECIFIED),
        ArpResolve::Failed,
        "unspecified fails"
    );
    assert_eq_test!(nic.sent_count(), 0, "neither touches the wire");
    pass!()
}

/// The probe tick retransmits on the adaptive-delay schedule.
pub fn test_probe_retry_on_tick() -> TestResult {
    let (device, nic) = setup();
    let context = arp::arp_context(&device);

    context.resolve(&device, GATEWAY_IP);
    assert_eq_test!(nic.take_frames().len(), 1, "initial request");

    // The first probe interval is 3 ticks; the third tick retransmits.
    context.tick(&device);
    context.tick(&device);
    assert_eq_test!(nic.sent_count(), 0, "no retry before the interval");
    context.tick(&device);
    assert_eq_test!(nic.take_frames().len(), 1, "retry after the interval");
    pass!()
}

/// Senders with group/zero/broadcast MACs never enter the cache.
pub fn test_invalid_sender_mac_rejected() -> TestResult {
    let (device, _nic) = setup();
    let context = arp::arp_context(&device);

    for bad in [
        MacAddr([0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]),
        MacAddr::ZERO,
        MacAddr::BROADCAST,
    ] {
        fixtures::inject_frame(
            &device,
            &fixtures::build_arp_reply(bad, GATEWAY_IP, TEST_NIC_MAC, LOCAL_IP),
        );
    }
    assert_eq_test!(context.valid_entries(), 0, "nothing learned from bad senders");
    pass!()
}

/// A request for the local address is answered with a reply, and the
/// requester is learned.
pub fn test_request_for_local_address_answered() -> TestResult {
    let (device, nic) = setup();
    let peer_mac = MacAddr([0x52, 0x54, 0x00, 0x01, 0x02, 0x03]);
    let peer_ip = Ipv4Addr::new(192, 168, 1, 77);

    fixtures::inject_frame(&device, &build_arp_request(peer_mac, peer_ip, LOCAL_IP));

    let frames = nic.take_frames();
    assert_eq_test!(frames.len(), 1, "one reply emitted");
    let packet = match ArpPacket::parse(&frames[0][ETH_HEADER_LEN..]) {
        Some(packet) => packet,
        None => return exos_lib::fail!("reply did not parse"),
    };
    assert_eq_test!(packet.op, ARP_OP_REPLY, "reply opcode");
    assert_eq_test!(packet.sender_ip, LOCAL_IP, "we are the sender");
    assert_eq_test!(packet.sender_mac, TEST_NIC_MAC, "with our mac");
    assert_eq_test!(packet.target_mac, peer_mac, "addressed to the requester");

    assert_eq_test!(
        arp::arp_context(&device).resolve(&device, peer_ip),
        ArpResolve::Resolved(peer_mac),
        "requester learned"
    );
    pass!()
}

/// Register/unregister with the same triple leaves the callback table
/// unchanged: a later resolution fires nothing.
pub fn test_notification_unregister_round_trip() -> TestResult {
    let (device, _nic) = setup();
    let context = arp::arp_context(&device);

    RESOLVED_HITS.store(0, Ordering::Relaxed);
    assert_test!(
        context.register_notification(NOTIF_EVENT_ARP_RESOLVED, capture_resolved, 0),
        "registered"
    );
    assert_test!(
        context.unregister_notification(NOTIF_EVENT_ARP_RESOLVED, capture_resolved, 0),
        "unregistered"
    );

    context.resolve(&device, GATEWAY_IP);
    fixtures::inject_frame(
        &device,
        &fixtures::build_arp_reply(
            MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            GATEWAY_IP,
            TEST_NIC_MAC,
            LOCAL_IP,
        ),
    );
    assert_eq_test!(RESOLVED_HITS.load(Ordering::Relaxed), 0, "no listener fired");
    pass!()
}

/// Contexts are created on demand and dropped with their slot: removing
/// the ARP tag forgets the cache.
pub fn test_context_map_lifecycle() -> TestResult {
    let (device, _nic) = setup();
    assert_eq_test!(device.driver_name(), "testnic", "driver identity recorded");

    fixtures::inject_frame(
        &device,
        &fixtures::build_arp_reply(
            MacAddr([0x52, 0x54, 0x00, 0xAA, 0xBB, 0xCC]),
            GATEWAY_IP,
            TEST_NIC_MAC,
            LOCAL_IP,
        ),
    );
    assert_eq_test!(arp::arp_context(&device).valid_entries(), 1, "entry learned");

    device.remove_context(crate::device::ContextTag::Arp);
    assert_eq_test!(
        arp::arp_context(&device).valid_entries(),
        0,
        "fresh context after removal"
    );
    pass!()
}

/// A request for someone else's address updates the cache but stays quiet.
pub fn test_request_for_other_address_ignored() -> TestResult {
    let (device, nic) = setup();
    let peer_mac = MacAddr([0x52, 0x54, 0x00, 0x01, 0x02, 0x03]);

    fixtures::inject_frame(
        &device,
        &build_arp_request(peer_mac, Ipv4Addr::new(192, 168, 1, 77), Ipv4Addr::new(192, 168, 1, 99)),
    );
    assert_eq_test!(nic.sent_count(), 0, "no reply for a foreign target");
    pass!()
}

pub fn run_suite() -> (u32, u32) {
    let mut passed = 0u32;
    let mut total = 0u32;
    run_test!(passed, total, test_resolve_immediate_from_cache);
    run_test!(passed, total, test_resolve_pending_then_resolved);
    run_test!(passed, total, test_resolve_special_addresses);
    run_test!(passed, total, test_probe_retry_on_tick);
    run_test!(passed, total, test_invalid_sender_mac_rejected);
    run_test!(passed, total, test_request_for_local_address_answered);
    run_test!(passed, total, test_request_for_other_address_ignored);
    run_test!(passed, total, test_notification_unregister_round_trip);
    run_test!(passed, total, test_context_map_lifecycle);
    (passed, total)
}

pub static SUITE: TestSuiteDesc = TestSuiteDesc {
    name: "arp",
    run: run_suite,
};
