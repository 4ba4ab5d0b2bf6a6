//! Shared fixtures for the in-kernel regression suites.
//!
//! Provides a deterministic platform service table (manually advanced
//! clock, fixed-stride RNG), a capturing network driver, and frame
//! builders for injecting traffic into the stack without hardware.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use exos_abi::driver::DriverVersion;
use exos_lib::IrqMutex;
use exos_lib::kernel_services::platform::{self, PlatformServices};

use crate::device::{Device, PCI_DEVICES};
use crate::error::DriverError;
use crate::net::arp::{ARP_OP_REPLY, ArpPacket};
use crate::net::ethernet;
use crate::net::netdev::{NetDeviceStats, NetworkDriver, NetworkInfo, RxCallback};
use crate::net::tcp::{self, TcpHeader};
use crate::net::types::{EtherType, IpProtocol, Ipv4Addr, MacAddr, Port};
use crate::net::{config, ipv4, tcp_conn};
use crate::pci_defs::PciDeviceInfo;

// =============================================================================
// Deterministic platform services
// =============================================================================

static FAKE_TICKS: AtomicU64 = AtomicU64::new(0);

fn fake_timer_ticks() -> u64 {
    FAKE_TICKS.load(Ordering::Relaxed)
}

/// One tick per millisecond keeps the arithmetic obvious in tests.
fn fake_timer_frequency() -> u32 {
    1000
}

fn fake_timer_sleep_ms(ms: u32) {
    FAKE_TICKS.fetch_add(ms as u64, Ordering::Relaxed);
}

fn fake_irq_mask(_irq: u8) -> i32 {
    0
}

fn fake_irq_unmask(_irq: u8) -> i32 {
    0
}

static FAKE_PLATFORM: PlatformServices = PlatformServices {
    timer_ticks: fake_timer_ticks,
    timer_frequency: fake_timer_frequency,
    timer_sleep_ms: fake_timer_sleep_ms,
    irq_mask: fake_irq_mask,
    irq_unmask: fake_irq_unmask,
};

/// Install the deterministic service table. Idempotent.
pub fn install_test_services() {
    platform::register_platform_services(&FAKE_PLATFORM);
}

/// Move the fake clock forward.
pub fn advance_time_ms(ms: u64) {
    FAKE_TICKS.fetch_add(ms, Ordering::Relaxed);
}

pub fn now_ms() -> u64 {
    platform::get_time_ms()
}

/// Reset every piece of global state a test can touch.
pub fn reset_stack() {
    install_test_services();
    PCI_DEVICES.reset();
    tcp_conn::tcp_reset_all();
    config::net_config_reset();
}

// =============================================================================
// Capturing network driver
// =============================================================================

pub const TEST_NIC_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x11, 0x22, 0x33]);

/// NIC stand-in that records transmitted frames instead of touching
/// hardware.
pub struct TestNic {
    mac: MacAddr,
    frames: IrqMutex<Vec<Vec<u8>>>,
}

impl TestNic {
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            frames: IrqMutex::new(Vec::new()),
        }
    }

    /// Drain and return everything sent since the last call.
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut *self.frames.lock())
    }

    pub fn sent_count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl NetworkDriver for TestNic {
    fn reset(&self) -> Result<(), DriverError> {
        self.frames.lock().clear();
        Ok(())
    }

    fn info(&self) -> NetworkInfo {
        NetworkInfo {
            mac: self.mac,
            mtu: 1500,
            link_up: true,
        }
    }

    fn send(&self, frame: &[u8]) -> Result<(), DriverError> {
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }

    fn poll(&self) -> u32 {
        0
    }

    fn set_rx_callback(&self, _callback: RxCallback, _user_data: usize) {}

    fn stats(&self) -> NetDeviceStats {
        NetDeviceStats::new()
    }
}

/// Build a registered device backed by a [`TestNic`].
pub fn make_net_device() -> (Arc<Device>, Arc<TestNic>) {
    let id = PCI_DEVICES.allocate_id();
    let device = Box::new(Device::new(
        id,
        PciDeviceInfo::zeroed(),
        "testnic",
        DriverVersion::new(0, 1),
    ));
    let nic = Arc::new(TestNic::new(TEST_NIC_MAC));
    device.set_network_ops(nic.clone());
    let device = PCI_DEVICES.register(device);
    (device, nic)
}

/// Inject a raw frame as if the NIC's poll path delivered it.
pub fn inject_frame(device: &Arc<Device>, frame: &[u8]) {
    ethernet::dispatch_frame(device, frame);
}

// =============================================================================
// Frame builders
// =============================================================================

/// An ARP reply `sender -> target`, framed for injection.
pub fn build_arp_reply(
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> Vec<u8> {
    let packet = ArpPacket::new(ARP_OP_REPLY, sender_mac, sender_ip, target_mac, target_ip);
    let mut payload = [0u8; crate::net::arp::ARP_PACKET_LEN];
    let _ = packet.write(&mut payload);

    let mut frame = alloc::vec![0u8; ethernet::ETH_HEADER_LEN + payload.len()];
    let _ = ethernet::build_frame(&mut frame, target_mac, sender_mac, EtherType::Arp, &payload);
    frame
}

/// An IPv4 frame carrying `payload`, with a valid header checksum.
pub fn build_ipv4_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    protocol: IpProtocol,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame =
        alloc::vec![0u8; ethernet::ETH_HEADER_LEN + ipv4::IPV4_HEADER_LEN + payload.len()];
    let header = ethernet::EthernetHeader {
        destination: dst_mac,
        source: src_mac,
        ethertype: EtherType::Ipv4.as_u16(),
    };
    let _ = header.write(&mut frame);
    let _ = ipv4::write_header(
        &mut frame[ethernet::ETH_HEADER_LEN..],
        0x4242,
        protocol,
        src_ip,
        dst_ip,
        payload.len(),
    );
    frame[ethernet::ETH_HEADER_LEN + ipv4::IPV4_HEADER_LEN..].copy_from_slice(payload);
    frame
}

/// A checksummed TCP segment (no options).
#[allow(clippy::too_many_arguments)]
pub fn build_tcp_segment(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: Port,
    dst_port: Port,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut segment = alloc::vec![0u8; tcp::TCP_HEADER_LEN + payload.len()];
    let header = TcpHeader {
        src_port: src_port.as_u16(),
        dst_port: dst_port.as_u16(),
        seq_num: seq,
        ack_num: ack,
        data_offset: 5,
        flags,
        window_size: window,
        checksum: 0,
        urgent_ptr: 0,
    };
    let _ = tcp::write_header(&header, &mut segment);
    segment[tcp::TCP_HEADER_LEN..].copy_from_slice(payload);
    let sum = tcp::tcp_checksum(src_ip, dst_ip, &segment);
    segment[16..18].copy_from_slice(&sum.to_be_bytes());
    segment
}

/// A complete Ethernet+IPv4+TCP frame from a remote peer.
#[allow(clippy::too_many_arguments)]
pub fn build_tcp_frame(
    remote_mac: MacAddr,
    local_mac: MacAddr,
    remote_ip: Ipv4Addr,
    local_ip: Ipv4Addr,
    remote_port: Port,
    local_port: Port,
    seq: u32,
    ack: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let segment = build_tcp_segment(
        remote_ip,
        local_ip,
        remote_port,
        local_port,
        seq,
        ack,
        flags,
        8192,
        payload,
    );
    build_ipv4_frame(
        remote_mac,
        local_mac,
        remote_ip,
        local_ip,
        IpProtocol::Tcp,
        &segment,
    )
}
