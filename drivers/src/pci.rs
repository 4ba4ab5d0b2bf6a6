//! PCI bus manager: configuration access, enumeration, driver binding.
//!
//! Configuration space is reached through the legacy port mechanism
//! (address 0xCF8, data 0xCFC). The enumerator walks every bus, matches
//! each present function against the registered driver tables, and binds
//! the first driver whose probe accepts the function. A successful attach
//! hands back an owned [`Device`] which is appended to the global list.

use alloc::boxed::Box;
use alloc::vec::Vec;

use exos_abi::driver::DriverVersion;
use exos_lib::ports::{PCI_CONFIG_ADDRESS, PCI_CONFIG_DATA};
use exos_lib::{IrqMutex, klog_debug, klog_info, klog_warn};

use crate::device::{Device, PCI_DEVICES};
use crate::pci_defs::*;

// =============================================================================
// Configuration space access (legacy port mechanism)
// =============================================================================

/// The 0xCF8/0xCFC pair is one shared resource: the address write and the
/// data access must not interleave between callers.
static CONFIG_LOCK: IrqMutex<()> = IrqMutex::new(());

#[inline]
fn config_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | (((device as u32) & 0x1F) << 11)
        | (((function as u32) & 0x07) << 8)
        | ((offset as u32) & 0xFC)
}

/// Read a 32-bit dword from configuration space. `offset` is dword-aligned.
pub fn pci_config_read32(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    let _guard = CONFIG_LOCK.lock();
    // SAFETY: the legacy mechanism ports are always present on this
    // platform; the lock serialises the address/data pair.
    unsafe {
        PCI_CONFIG_ADDRESS.write(config_address(bus, device, function, offset));
        PCI_CONFIG_DATA.read()
    }
}

/// Write a 32-bit dword to configuration space.
pub fn pci_config_write32(bus: u8, device: u8, function: u8, offset: u8, value: u32) {
    let _guard = CONFIG_LOCK.lock();
    // SAFETY: see `pci_config_read32`.
    unsafe {
        PCI_CONFIG_ADDRESS.write(config_address(bus, device, function, offset));
        PCI_CONFIG_DATA.write(value);
    }
}

/// Read a 16-bit field by extracting it from the containing dword.
pub fn pci_config_read16(bus: u8, device: u8, function: u8, offset: u8) -> u16 {
    let dword = pci_config_read32(bus, device, function, offset & 0xFC);
    (dword >> ((offset as u32 & 0x02) * 8)) as u16
}

/// Read an 8-bit field by extracting it from the containing dword.
pub fn pci_config_read8(bus: u8, device: u8, function: u8, offset: u8) -> u8 {
    let dword = pci_config_read32(bus, device, function, offset & 0xFC);
    (dword >> ((offset as u32 & 0x03) * 8)) as u8
}

/// Write a 16-bit field with a read-modify-write of the containing dword.
pub fn pci_config_write16(bus: u8, device: u8, function: u8, offset: u8, value: u16) {
    let aligned = offset & 0xFC;
    let shift = (offset as u32 & 0x02) * 8;
    let old = pci_config_read32(bus, device, function, aligned);
    let new = (old & !(0xFFFFu32 << shift)) | ((value as u32) << shift);
    pci_config_write32(bus, device, function, aligned, new);
}

// =============================================================================
// Function snapshot
// =============================================================================

/// Populate a [`PciDeviceInfo`] for a present function.
pub fn pci_read_function(bus: u8, device: u8, function: u8) -> PciDeviceInfo {
    let mut info = PciDeviceInfo::zeroed();
    info.bus = bus;
    info.device = device;
    info.function = function;

    let id = pci_config_read32(bus, device, function, PCI_REG_VENDOR_ID);
    info.vendor_id = id as u16;
    info.device_id = (id >> 16) as u16;

    let class = pci_config_read32(bus, device, function, PCI_REG_REVISION);
    info.revision = class as u8;
    info.prog_if = (class >> 8) as u8;
    info.sub_class = (class >> 16) as u8;
    info.base_class = (class >> 24) as u8;

    info.header_type = pci_config_read8(bus, device, function, PCI_REG_HEADER_TYPE);

    for index in 0..PCI_BAR_COUNT {
        let offset = PCI_REG_BAR0 + (index as u8) * 4;
        let raw = pci_config_read32(bus, device, function, offset);
        info.bar[index] = raw;
        info.bar_base[index] = if raw & PCI_BAR_IO_SPACE != 0 {
            raw & PCI_BAR_IO_MASK
        } else {
            raw & PCI_BAR_MEM_MASK
        };
    }

    info.irq_line = pci_config_read8(bus, device, function, PCI_REG_IRQ_LINE);
    info.irq_pin = pci_config_read8(bus, device, function, PCI_REG_IRQ_PIN);
    info
}

// =============================================================================
// BAR probing
// =============================================================================

/// Decoded base address of a BAR (type bits masked).
pub fn pci_bar_base(bus: u8, device: u8, function: u8, bar: usize) -> u32 {
    let raw = pci_config_read32(bus, device, function, PCI_REG_BAR0 + (bar as u8) * 4);
    if raw & PCI_BAR_IO_SPACE != 0 {
        raw & PCI_BAR_IO_MASK
    } else {
        raw & PCI_BAR_MEM_MASK
    }
}

/// Size of a BAR via the write-ones-read-back probe.
///
/// The original value is restored before returning. For a 64-bit memory BAR
/// the high dword is probed (and restored) as well; a window that does not
/// fit 32 bits reports size 0; DMA above 4 GiB is out of scope.
pub fn pci_bar_size(bus: u8, device: u8, function: u8, bar: usize) -> u32 {
    let offset = PCI_REG_BAR0 + (bar as u8) * 4;
    let original = pci_config_read32(bus, device, function, offset);

    pci_config_write32(bus, device, function, offset, 0xFFFF_FFFF);
    let mask = pci_config_read32(bus, device, function, offset);
    pci_config_write32(bus, device, function, offset, original);

    if mask == 0 {
        return 0;
    }

    if original & PCI_BAR_IO_SPACE != 0 {
        return (!(mask & PCI_BAR_IO_MASK)).wrapping_add(1);
    }

    let size = (!(mask & PCI_BAR_MEM_MASK)).wrapping_add(1);

    if original & PCI_BAR_MEM_TYPE_MASK == PCI_BAR_MEM_TYPE_64 && bar + 1 < PCI_BAR_COUNT {
        let high_offset = offset + 4;
        let high_original = pci_config_read32(bus, device, function, high_offset);
        pci_config_write32(bus, device, function, high_offset, 0xFFFF_FFFF);
        let high_mask = pci_config_read32(bus, device, function, high_offset);
        pci_config_write32(bus, device, function, high_offset, high_original);
        if high_mask != 0xFFFF_FFFF {
            // Window larger than 4 GiB; unusable here.
            return 0;
        }
    }

    size
}

/// Set Bus-Master and Memory-Space in COMMAND; returns the previous value.
pub fn pci_enable_bus_master(bus: u8, device: u8, function: u8) -> u16 {
    let previous = pci_config_read16(bus, device, function, PCI_REG_COMMAND);
    let wanted = PciCommand::from_bits_truncate(previous)
        .union(PciCommand::BUS_MASTER)
        .union(PciCommand::MEM_SPACE);
    pci_config_write16(bus, device, function, PCI_REG_COMMAND, wanted.bits());
    previous
}

// =============================================================================
// Capability traversal
// =============================================================================

/// Walk the capability list looking for `cap_id`. Returns the config-space
/// offset of the capability header.
pub fn pci_find_capability(bus: u8, device: u8, function: u8, cap_id: u8) -> Option<u8> {
    let status = pci_config_read16(bus, device, function, PCI_REG_STATUS);
    if status & PCI_STATUS_CAP_LIST == 0 {
        return None;
    }

    let mut offset = pci_config_read8(bus, device, function, PCI_REG_CAP_PTR) & 0xFC;
    let mut iterations = 0;
    while offset != 0 && iterations < PCI_CAP_MAX_ITERATIONS {
        let header = pci_config_read16(bus, device, function, offset);
        let id = header as u8;
        let next = (header >> 8) as u8 & 0xFC;
        if id == cap_id {
            return Some(offset);
        }
        offset = next;
        iterations += 1;
    }
    None
}

// =============================================================================
// Driver registry and binding
// =============================================================================

/// Driver callbacks invoked by the enumerator.
///
/// `attach` must return a *new heap-allocated* device; the signature makes
/// returning the scanner's temporary unrepresentable.
pub trait PciDriverOps: Sync {
    /// Inspect the function beyond the match rules; reject with `false`.
    fn probe(&self, info: &PciDeviceInfo) -> bool;

    /// One-time driver setup, run on first successful probe.
    fn load(&self) {}

    /// Bring the function up and produce its device object, or `None` on
    /// failure (the scanner then leaves the function unbound).
    fn attach(&self, info: &PciDeviceInfo) -> Option<Box<Device>>;
}

/// A registered PCI driver: identity, match table, callbacks.
pub struct PciDriverDesc {
    pub name: &'static str,
    pub version: DriverVersion,
    pub matches: &'static [PciMatchRule],
    pub ops: &'static dyn PciDriverOps,
}

static DRIVER_REGISTRY: IrqMutex<Vec<&'static PciDriverDesc>> = IrqMutex::new(Vec::new());

/// Register a driver before (or between) scans.
pub fn pci_register_driver(desc: &'static PciDriverDesc) {
    klog_debug!("pci: registered driver '{}'", desc.name);
    DRIVER_REGISTRY.lock().push(desc);
}

fn match_and_bind(info: &PciDeviceInfo) -> bool {
    let drivers: Vec<&'static PciDriverDesc> = DRIVER_REGISTRY.lock().clone();
    for desc in drivers {
        if !desc.matches.iter().any(|rule| rule.matches(info)) {
            continue;
        }
        if !desc.ops.probe(info) {
            klog_debug!(
                "pci: driver '{}' declined {:04x}:{:04x}",
                desc.name,
                info.vendor_id,
                info.device_id
            );
            continue;
        }
        desc.ops.load();
        match desc.ops.attach(info) {
            Some(device) => {
                let device = PCI_DEVICES.register(device);
                klog_info!(
                    "pci: {:02x}:{:02x}.{} {:04x}:{:04x} bound to '{}' as device {}",
                    info.bus,
                    info.device,
                    info.function,
                    info.vendor_id,
                    info.device_id,
                    desc.name,
                    device.id()
                );
                return true;
            }
            None => {
                klog_warn!(
                    "pci: driver '{}' failed to attach {:04x}:{:04x}",
                    desc.name,
                    info.vendor_id,
                    info.device_id
                );
                // First matching driver wins or the function stays unbound.
                return false;
            }
        }
    }
    false
}

// =============================================================================
// Enumeration
// =============================================================================

/// Walk every bus/device/function, snapshot present functions, bind drivers.
///
/// Returns the number of functions found.
pub fn pci_scan() -> usize {
    let mut found = 0;

    for bus in 0..PCI_MAX_BUSES as u16 {
        let bus = bus as u8;
        for device in 0..PCI_MAX_DEVICES_PER_BUS {
            let vendor = pci_config_read16(bus, device, 0, PCI_REG_VENDOR_ID);
            if vendor == PCI_VENDOR_NONE {
                continue;
            }

            let header = pci_config_read8(bus, device, 0, PCI_REG_HEADER_TYPE);
            let function_count = if header & PCI_HEADER_TYPE_MULTIFUNCTION != 0 {
                PCI_MAX_FUNCTIONS
            } else {
                1
            };

            for function in 0..function_count {
                let vendor = pci_config_read16(bus, device, function, PCI_REG_VENDOR_ID);
                if vendor == PCI_VENDOR_NONE {
                    continue;
                }

                let info = pci_read_function(bus, device, function);
                found += 1;

                klog_debug!(
                    "pci: {:02x}:{:02x}.{} {:04x}:{:04x} class {:02x}.{:02x}.{:02x} irq {}",
                    bus,
                    device,
                    function,
                    info.vendor_id,
                    info.device_id,
                    info.base_class,
                    info.sub_class,
                    info.prog_if,
                    info.irq_line
                );

                match_and_bind(&info);
            }
        }
    }

    klog_info!(
        "pci: scan complete, {} functions, {} devices bound",
        found,
        PCI_DEVICES.count()
    );
    found
}
