//! Boot-time wiring of the device and network subsystems.
//!
//! The kernel entry path calls [`platform_init`] once the memory and
//! platform service tables are registered, then drives the stack with the
//! tick hooks below.

use alloc::sync::Arc;

use exos_lib::kernel_services::platform;
use exos_lib::{InitFlag, klog_info};

use crate::device::{Device, DeviceId, PCI_DEVICES};
use crate::net::types::Ipv4Addr;
use crate::net::{arp, config, e1000, ipv4, tcp_conn};
use crate::pci;
use crate::storage::ata;

static PLATFORM_INIT: InitFlag = InitFlag::new();

/// Register drivers, scan the bus, probe disks. Idempotent; only the first
/// caller performs the work.
pub fn platform_init(cmdline: &str) {
    if !PLATFORM_INIT.begin_init() {
        return;
    }

    config::net_config_parse(cmdline);

    pci::pci_register_driver(&e1000::E1000_DRIVER);
    pci::pci_scan();

    let disks = ata::ata_init();
    klog_info!(
        "platform: {} pci devices bound, {} disks",
        PCI_DEVICES.count(),
        disks
    );
}

/// Give a NIC its address plan and bring the protocol layers up on it.
pub fn configure_interface(
    device_id: DeviceId,
    address: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Ipv4Addr,
) -> bool {
    let Some(device) = PCI_DEVICES.by_id(device_id) else {
        return false;
    };
    if device.network().is_none() {
        return false;
    }
    ipv4::ipv4_initialize(&device, address, netmask, gateway);
    tcp_conn::tcp_initialize(&device);
    klog_info!(
        "net: device {} configured {} mask {} gw {}",
        device_id,
        address,
        netmask,
        gateway
    );
    true
}

fn network_devices() -> alloc::vec::Vec<Arc<Device>> {
    PCI_DEVICES
        .list()
        .into_iter()
        .filter(|device| device.network().is_some())
        .collect()
}

/// Fast path, every timer tick: drain NIC receive rings and run TCP
/// timers.
pub fn network_poll() {
    let now_ms = platform::get_time_ms();
    for device in network_devices() {
        if let Some(net) = device.network() {
            net.poll();
        }
    }
    tcp_conn::tcp_tick_all(now_ms);
    tcp_conn::tcp_reap_closed();
}

/// Slow path, ~1 Hz: ARP cache aging and probe retries.
pub fn network_second_tick() {
    for device in network_devices() {
        arp::arp_context(&device).tick(&device);
    }
}
