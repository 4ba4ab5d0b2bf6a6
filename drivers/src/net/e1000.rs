//! Intel E1000 (82540EM) network controller driver.
//!
//! Polled ring driver: one page holds each descriptor ring, one page per
//! slot holds the DMA buffer (2 KiB used). Interrupts stay masked (IMC);
//! the kernel tick drives [`NetworkDriver::poll`].
//!
//! Ring ownership follows the hardware's model:
//! - RX: RDT trails the software head by the whole ring; every descriptor
//!   between RDH and RDT belongs to the NIC. `RDH == RDT` means the NIC has
//!   nowhere to write and silently drops.
//! - TX: `(TDT + 1) % N == TDH` means full; the driver reports the failure
//!   instead of blocking.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use exos_abi::PhysAddr;
use exos_abi::driver::DriverVersion;
use exos_lib::kernel_services::platform;
use exos_lib::{IrqMutex, klog_debug, klog_error, klog_info, klog_warn};
use exos_mm::{MmioRegion, OwnedPageFrame};

use crate::device::{Device, DeviceId, PCI_DEVICES};
use crate::error::DriverError;
use crate::net::ethernet;
use crate::net::netdev::{NetDeviceStats, NetworkDriver, NetworkInfo, RxCallback};
use crate::net::types::MacAddr;
use crate::pci::{
    PciDriverDesc, PciDriverOps, pci_bar_base, pci_bar_size, pci_enable_bus_master,
    pci_find_capability,
};
use crate::pci_defs::{
    PCI_CAP_ID_MSI, PCI_CLASS_NETWORK, PCI_SUBCLASS_ETHERNET, PciDeviceInfo, PciMatchRule,
};

pub const E1000_VENDOR_INTEL: u16 = 0x8086;
pub const E1000_DEVICE_82540EM: u16 = 0x100E;

// ---------------------------------------------------------------------------
// Register map
// ---------------------------------------------------------------------------

const REG_CTRL: usize = 0x0000;
const REG_STATUS: usize = 0x0008;
const REG_EERD: usize = 0x0014;
const REG_IMC: usize = 0x00D8;
const REG_RCTL: usize = 0x0100;
const REG_TCTL: usize = 0x0400;
const REG_TIPG: usize = 0x0410;
const REG_RDBAL: usize = 0x2800;
const REG_RDBAH: usize = 0x2804;
const REG_RDLEN: usize = 0x2808;
const REG_RDH: usize = 0x2810;
const REG_RDT: usize = 0x2818;
const REG_TDBAL: usize = 0x3800;
const REG_TDBAH: usize = 0x3804;
const REG_TDLEN: usize = 0x3808;
const REG_TDH: usize = 0x3810;
const REG_TDT: usize = 0x3818;
const REG_MTA: usize = 0x5200;
const REG_RAL0: usize = 0x5400;
const REG_RAH0: usize = 0x5404;

const CTRL_FD: u32 = 1 << 0;
const CTRL_SLU: u32 = 1 << 6;
const CTRL_RST: u32 = 1 << 26;

const STATUS_LU: u32 = 1 << 1;

const EERD_START: u32 = 1 << 0;
const EERD_DONE: u32 = 1 << 4;
const EERD_ADDR_SHIFT: u32 = 8;
const EERD_DATA_SHIFT: u32 = 16;

const RCTL_EN: u32 = 1 << 1;
const RCTL_UPE: u32 = 1 << 3;
const RCTL_MPE: u32 = 1 << 4;
const RCTL_BAM: u32 = 1 << 15;
const RCTL_BSIZE_2048: u32 = 0;
const RCTL_SECRC: u32 = 1 << 26;

const TCTL_EN: u32 = 1 << 1;
const TCTL_PSP: u32 = 1 << 3;
const TCTL_CT_SHIFT: u32 = 4;
const TCTL_COLD_SHIFT: u32 = 12;
const TCTL_CT_DEFAULT: u32 = 0x10;
const TCTL_COLD_DEFAULT: u32 = 0x40;

/// Inter-packet gap for 1 Gb full duplex; value QEMU is happy with.
const TIPG_DEFAULT: u32 = 0x0060_2008;

/// RAH bit 31: address valid.
const RAH_AV: u32 = 1 << 31;

/// Fallback when both RAL/RAH and the EEPROM come up empty (fresh QEMU
/// instances with no configured NIC identity).
const FALLBACK_MAC: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

/// Multicast table array entries to clear.
const MTA_ENTRIES: usize = 128;

pub const E1000_RX_DESC_COUNT: usize = 128;
pub const E1000_TX_DESC_COUNT: usize = 128;
pub const E1000_BUF_SIZE: usize = 2048;

/// Iteration ceiling for the hardware handshake spins.
const SPIN_LIMIT: u32 = 100_000;
/// Wall-clock ceiling paired with the iteration limit.
const SPIN_DEADLINE_MS: u64 = 100;

pub const RX_STA_DD: u8 = 1 << 0;
pub const RX_STA_EOP: u8 = 1 << 1;
pub const TX_CMD_EOP: u8 = 1 << 0;
pub const TX_CMD_IFCS: u8 = 1 << 1;
pub const TX_CMD_RS: u8 = 1 << 3;
pub const TX_STA_DD: u8 = 1 << 0;

// ---------------------------------------------------------------------------
// Descriptor layout
// ---------------------------------------------------------------------------

/// Legacy receive descriptor (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RxDescriptor {
    pub buffer_addr: u64,
    pub length: u16,
    pub checksum: u16,
    pub status: u8,
    pub errors: u8,
    pub special: u16,
}

/// Legacy transmit descriptor (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct TxDescriptor {
    pub buffer_addr: u64,
    pub length: u16,
    pub cso: u8,
    pub cmd: u8,
    pub status: u8,
    pub css: u8,
    pub special: u16,
}

// ---------------------------------------------------------------------------
// MAC selection helpers (pure, also exercised by the tests)
// ---------------------------------------------------------------------------

/// Decode the RAL0/RAH0 pair; `Some` only for a valid unicast with AV set.
pub fn mac_from_receive_address(low: u32, high: u32) -> Option<MacAddr> {
    if high & RAH_AV == 0 {
        return None;
    }
    let mac = MacAddr([
        low as u8,
        (low >> 8) as u8,
        (low >> 16) as u8,
        (low >> 24) as u8,
        high as u8,
        (high >> 8) as u8,
    ]);
    if mac.is_valid_unicast() { Some(mac) } else { None }
}

/// Assemble a MAC from the first three EEPROM words (little-endian within
/// each word). `None` when the EEPROM reads all-zero.
pub fn mac_from_eeprom_words(w0: u16, w1: u16, w2: u16) -> Option<MacAddr> {
    if w0 == 0 && w1 == 0 && w2 == 0 {
        return None;
    }
    Some(MacAddr([
        w0 as u8,
        (w0 >> 8) as u8,
        w1 as u8,
        (w1 >> 8) as u8,
        w2 as u8,
        (w2 >> 8) as u8,
    ]))
}

/// TX ring full predicate: the tail may never run into the head.
#[inline]
pub const fn tx_ring_full(tdt: u32, tdh: u32, ring_len: u32) -> bool {
    (tdt + 1) % ring_len == tdh
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

struct RxRing {
    ring: OwnedPageFrame,
    buffers: Vec<OwnedPageFrame>,
    head: u32,
}

struct TxRing {
    ring: OwnedPageFrame,
    buffers: Vec<OwnedPageFrame>,
    tail: u32,
}

struct E1000Inner {
    rx: RxRing,
    tx: TxRing,
    rx_callback: Option<(RxCallback, usize)>,
    stats: NetDeviceStats,
}

/// Per-NIC driver state, shared as the device's network operations.
pub struct E1000State {
    device_id: DeviceId,
    mmio: MmioRegion,
    mac: MacAddr,
    inner: IrqMutex<E1000Inner>,
}

impl RxRing {
    fn descriptors(&self) -> *mut RxDescriptor {
        self.ring.as_mut_ptr::<RxDescriptor>()
    }
}

impl TxRing {
    fn descriptors(&self) -> *mut TxDescriptor {
        self.ring.as_mut_ptr::<TxDescriptor>()
    }
}

#[inline]
fn read_reg(mmio: &MmioRegion, reg: usize) -> u32 {
    // SAFETY: the register map above stays inside BAR0, which the probe
    // verified to be large enough.
    unsafe { mmio.read32(reg) }
}

#[inline]
fn write_reg(mmio: &MmioRegion, reg: usize, value: u32) {
    // SAFETY: see `read_reg`.
    unsafe { mmio.write32(reg, value) }
}

/// Spin until `done` returns true, bounded by both an iteration ceiling and
/// a wall-clock deadline.
fn bounded_spin(mut done: impl FnMut() -> bool) -> bool {
    let deadline = platform::get_time_ms() + SPIN_DEADLINE_MS;
    let mut count = 0;
    while count < SPIN_LIMIT {
        if done() {
            return true;
        }
        if platform::get_time_ms() > deadline {
            break;
        }
        count += 1;
        core::hint::spin_loop();
    }
    false
}

impl E1000State {
    fn eeprom_read_word(mmio: &MmioRegion, address: u32) -> u16 {
        write_reg(
            mmio,
            REG_EERD,
            ((address & 0xFF) << EERD_ADDR_SHIFT) | EERD_START,
        );
        let mut value = 0;
        let ok = bounded_spin(|| {
            value = read_reg(mmio, REG_EERD);
            value & EERD_DONE != 0
        });
        if !ok {
            klog_error!("e1000: eeprom read timeout at word {}", address);
            return 0;
        }
        (value >> EERD_DATA_SHIFT) as u16
    }

    /// Reset the controller: RST, wait for clear, force link up + full
    /// duplex, mask every interrupt source.
    fn hardware_reset(mmio: &MmioRegion) -> Result<(), DriverError> {
        let ctrl = read_reg(mmio, REG_CTRL);
        write_reg(mmio, REG_CTRL, ctrl | CTRL_RST);

        if !bounded_spin(|| read_reg(mmio, REG_CTRL) & CTRL_RST == 0) {
            return Err(DriverError::Timeout);
        }

        let ctrl = read_reg(mmio, REG_CTRL);
        write_reg(mmio, REG_CTRL, ctrl | CTRL_SLU | CTRL_FD);
        write_reg(mmio, REG_IMC, 0xFFFF_FFFF);
        Ok(())
    }

    /// Determine the MAC: adopt a valid RAL0/RAH0, else the EEPROM words,
    /// else the fixed fallback; program the result back with AV set and
    /// clear the multicast table.
    fn setup_mac(mmio: &MmioRegion) -> MacAddr {
        let low = read_reg(mmio, REG_RAL0);
        let high = read_reg(mmio, REG_RAH0);

        let mac = mac_from_receive_address(low, high).unwrap_or_else(|| {
            let w0 = Self::eeprom_read_word(mmio, 0);
            let w1 = Self::eeprom_read_word(mmio, 1);
            let w2 = Self::eeprom_read_word(mmio, 2);
            let mac = mac_from_eeprom_words(w0, w1, w2).unwrap_or(FALLBACK_MAC);

            let low = u32::from_le_bytes([mac.0[0], mac.0[1], mac.0[2], mac.0[3]]);
            let high = u32::from(mac.0[4]) | (u32::from(mac.0[5]) << 8) | RAH_AV;
            write_reg(mmio, REG_RAL0, low);
            write_reg(mmio, REG_RAH0, high);
            mac
        });

        for entry in 0..MTA_ENTRIES {
            write_reg(mmio, REG_MTA + entry * 4, 0);
        }
        mac
    }

    fn setup_rx(mmio: &MmioRegion) -> Result<RxRing, DriverError> {
        let ring_page = OwnedPageFrame::alloc_zeroed().ok_or(DriverError::Unexpected)?;
        if ring_page.phys_u64() & 0xF != 0 {
            return Err(DriverError::Unexpected);
        }

        let mut buffers = Vec::with_capacity(E1000_RX_DESC_COUNT);
        let descriptors = ring_page.as_mut_ptr::<RxDescriptor>();
        for index in 0..E1000_RX_DESC_COUNT {
            let buffer = OwnedPageFrame::alloc_zeroed().ok_or(DriverError::Unexpected)?;
            let phys = buffer.phys_u64();
            if phys == 0 || phys & 0xF != 0 {
                return Err(DriverError::Unexpected);
            }
            // SAFETY: `descriptors` points at a zeroed page that fits the
            // whole ring (128 * 16 bytes).
            unsafe {
                descriptors.add(index).write(RxDescriptor {
                    buffer_addr: phys,
                    ..RxDescriptor::default()
                });
            }
            buffers.push(buffer);
        }

        write_reg(mmio, REG_RDBAL, ring_page.phys_u64() as u32);
        write_reg(mmio, REG_RDBAH, (ring_page.phys_u64() >> 32) as u32);
        write_reg(
            mmio,
            REG_RDLEN,
            (E1000_RX_DESC_COUNT * size_of::<RxDescriptor>()) as u32,
        );
        write_reg(mmio, REG_RDH, 0);
        // The hardware owns every descriptor: 0 .. N-1.
        write_reg(mmio, REG_RDT, (E1000_RX_DESC_COUNT - 1) as u32);
        // UPE|MPE keep lab bring-up simple under QEMU's default wiring.
        write_reg(
            mmio,
            REG_RCTL,
            RCTL_EN | RCTL_BAM | RCTL_BSIZE_2048 | RCTL_SECRC | RCTL_UPE | RCTL_MPE,
        );

        Ok(RxRing {
            ring: ring_page,
            buffers,
            head: 0,
        })
    }

    fn setup_tx(mmio: &MmioRegion) -> Result<TxRing, DriverError> {
        let ring_page = OwnedPageFrame::alloc_zeroed().ok_or(DriverError::Unexpected)?;
        if ring_page.phys_u64() & 0xF != 0 {
            return Err(DriverError::Unexpected);
        }

        let mut buffers = Vec::with_capacity(E1000_TX_DESC_COUNT);
        let descriptors = ring_page.as_mut_ptr::<TxDescriptor>();
        for index in 0..E1000_TX_DESC_COUNT {
            let buffer = OwnedPageFrame::alloc_zeroed().ok_or(DriverError::Unexpected)?;
            let phys = buffer.phys_u64();
            if phys == 0 || phys & 0xF != 0 {
                return Err(DriverError::Unexpected);
            }
            // Descriptors start "done" so the first send finds them free.
            // SAFETY: same bounds as the RX ring.
            unsafe {
                descriptors.add(index).write(TxDescriptor {
                    buffer_addr: phys,
                    status: TX_STA_DD,
                    ..TxDescriptor::default()
                });
            }
            buffers.push(buffer);
        }

        write_reg(mmio, REG_TDBAL, ring_page.phys_u64() as u32);
        write_reg(mmio, REG_TDBAH, (ring_page.phys_u64() >> 32) as u32);
        write_reg(
            mmio,
            REG_TDLEN,
            (E1000_TX_DESC_COUNT * size_of::<TxDescriptor>()) as u32,
        );
        write_reg(mmio, REG_TDH, 0);
        write_reg(mmio, REG_TDT, 0);
        write_reg(
            mmio,
            REG_TCTL,
            TCTL_EN
                | TCTL_PSP
                | (TCTL_CT_DEFAULT << TCTL_CT_SHIFT)
                | (TCTL_COLD_DEFAULT << TCTL_COLD_SHIFT),
        );
        write_reg(mmio, REG_TIPG, TIPG_DEFAULT);

        Ok(TxRing {
            ring: ring_page,
            buffers,
            tail: 0,
        })
    }

    /// Full bring-up for one PCI function.
    fn bring_up(device_id: DeviceId, info: &PciDeviceInfo) -> Result<Arc<Self>, DriverError> {
        let bar0 = pci_bar_base(info.bus, info.device, info.function, 0);
        let size = pci_bar_size(info.bus, info.device, info.function, 0);
        if bar0 == 0 || size == 0 {
            klog_error!("e1000: invalid BAR0 (base {:#x}, size {:#x})", bar0, size);
            return Err(DriverError::BadParameter);
        }

        let mmio =
            MmioRegion::map(PhysAddr::new(bar0 as u64), size as usize).ok_or(DriverError::Unexpected)?;

        pci_enable_bus_master(info.bus, info.device, info.function);

        // Polled driver: MSI stays unused, but knowing it is there helps
        // when a trace shows unexpected interrupt behavior.
        if let Some(offset) =
            pci_find_capability(info.bus, info.device, info.function, PCI_CAP_ID_MSI)
        {
            klog_debug!("e1000: MSI capability at config offset {:#x}", offset);
        }

        Self::hardware_reset(&mmio)?;
        let mac = Self::setup_mac(&mmio);
        let rx = Self::setup_rx(&mmio)?;
        let tx = Self::setup_tx(&mmio)?;

        klog_info!(
            "e1000: {:02x}:{:02x}.{} up, mac {}, mmio {:#x} ({} KiB)",
            info.bus,
            info.device,
            info.function,
            mac,
            mmio.phys_base().as_u64(),
            mmio.size() / 1024
        );

        Ok(Arc::new(Self {
            device_id,
            mmio,
            mac,
            inner: IrqMutex::new(E1000Inner {
                rx,
                tx,
                rx_callback: None,
                stats: NetDeviceStats::new(),
            }),
        }))
    }
}

impl NetworkDriver for E1000State {
    fn reset(&self) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        Self::hardware_reset(&self.mmio)?;
        Self::setup_mac(&self.mmio);

        // Rebuild ring registers around the existing allocations.
        let rx_phys = inner.rx.ring.phys_u64();
        write_reg(&self.mmio, REG_RDBAL, rx_phys as u32);
        write_reg(&self.mmio, REG_RDBAH, (rx_phys >> 32) as u32);
        write_reg(
            &self.mmio,
            REG_RDLEN,
            (E1000_RX_DESC_COUNT * size_of::<RxDescriptor>()) as u32,
        );
        write_reg(&self.mmio, REG_RDH, 0);
        write_reg(&self.mmio, REG_RDT, (E1000_RX_DESC_COUNT - 1) as u32);
        write_reg(
            &self.mmio,
            REG_RCTL,
            RCTL_EN | RCTL_BAM | RCTL_BSIZE_2048 | RCTL_SECRC | RCTL_UPE | RCTL_MPE,
        );
        inner.rx.head = 0;

        let tx_phys = inner.tx.ring.phys_u64();
        write_reg(&self.mmio, REG_TDBAL, tx_phys as u32);
        write_reg(&self.mmio, REG_TDBAH, (tx_phys >> 32) as u32);
        write_reg(
            &self.mmio,
            REG_TDLEN,
            (E1000_TX_DESC_COUNT * size_of::<TxDescriptor>()) as u32,
        );
        write_reg(&self.mmio, REG_TDH, 0);
        write_reg(&self.mmio, REG_TDT, 0);
        write_reg(
            &self.mmio,
            REG_TCTL,
            TCTL_EN
                | TCTL_PSP
                | (TCTL_CT_DEFAULT << TCTL_CT_SHIFT)
                | (TCTL_COLD_DEFAULT << TCTL_COLD_SHIFT),
        );
        write_reg(&self.mmio, REG_TIPG, TIPG_DEFAULT);
        inner.tx.tail = 0;

        let descriptors = inner.tx.descriptors();
        for index in 0..E1000_TX_DESC_COUNT {
            // SAFETY: descriptor index is in bounds; we own the ring page.
            unsafe {
                (*descriptors.add(index)).status = TX_STA_DD;
                (*descriptors.add(index)).cmd = 0;
            }
        }
        Ok(())
    }

    fn info(&self) -> NetworkInfo {
        NetworkInfo {
            mac: self.mac,
            mtu: 1500,
            link_up: read_reg(&self.mmio, REG_STATUS) & STATUS_LU != 0,
        }
    }

    fn send(&self, frame: &[u8]) -> Result<(), DriverError> {
        if frame.is_empty() || frame.len() > E1000_BUF_SIZE {
            return Err(DriverError::BadParameter);
        }

        let mut inner = self.inner.lock();
        let index = inner.tx.tail as usize;

        let tdh = read_reg(&self.mmio, REG_TDH);
        if tx_ring_full(inner.tx.tail, tdh, E1000_TX_DESC_COUNT as u32) {
            inner.stats.tx_dropped += 1;
            return Err(DriverError::Unexpected);
        }

        // SAFETY: `index < E1000_TX_DESC_COUNT`; the buffer page is owned by
        // the ring and at least `E1000_BUF_SIZE` bytes.
        unsafe {
            core::ptr::copy_nonoverlapping(
                frame.as_ptr(),
                inner.tx.buffers[index].as_mut_ptr::<u8>(),
                frame.len(),
            );
            let descriptor = inner.tx.descriptors().add(index);
            (*descriptor).length = frame.len() as u16;
            (*descriptor).cmd = TX_CMD_EOP | TX_CMD_IFCS | TX_CMD_RS;
            (*descriptor).status = 0;
        }

        let new_tail = ((index + 1) % E1000_TX_DESC_COUNT) as u32;
        inner.tx.tail = new_tail;
        write_reg(&self.mmio, REG_TDT, new_tail);

        // SAFETY: reading the status byte of a descriptor we own.
        let descriptor = inner.tx.descriptors();
        let done = bounded_spin(|| unsafe { (*descriptor.add(index)).status & TX_STA_DD != 0 });

        if !done {
            inner.stats.tx_errors += 1;
            klog_warn!("e1000: tx descriptor {} never reported done", index);
            return Err(DriverError::NetTxFail);
        }

        inner.stats.tx_packets += 1;
        inner.stats.tx_bytes += frame.len() as u64;
        Ok(())
    }

    fn poll(&self) -> u32 {
        // Frames are copied out under the lock, dispatched after releasing
        // it, since the callback re-enters the stack and may transmit.
        let mut received: Vec<Vec<u8>> = Vec::new();
        let callback;
        {
            let mut inner = self.inner.lock();
            callback = inner.rx_callback;

            let descriptors = inner.rx.descriptors();
            let mut iterations = 0;
            let mut empty_checks = 0;

            // Twice the ring as a hard bound; three consecutive empty reads
            // (with a short pause) tolerate QEMU's delayed status writes.
            while iterations < 2 * E1000_RX_DESC_COUNT {
                let index = inner.rx.head as usize % E1000_RX_DESC_COUNT;
                // SAFETY: index bounded by the ring length.
                let status = unsafe { (*descriptors.add(index)).status };

                if status & RX_STA_DD == 0 {
                    empty_checks += 1;
                    if empty_checks >= 3 {
                        break;
                    }
                    for _ in 0..10 {
                        core::hint::spin_loop();
                    }
                    continue;
                }
                empty_checks = 0;

                if status & RX_STA_EOP != 0 {
                    // SAFETY: length comes from the NIC but is clamped to the
                    // buffer size before the copy.
                    let length = unsafe { (*descriptors.add(index)).length } as usize;
                    let length = length.min(E1000_BUF_SIZE);
                    let mut frame = alloc::vec![0u8; length];
                    // SAFETY: the slot buffer is a full page, >= length.
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            inner.rx.buffers[index].as_ptr::<u8>(),
                            frame.as_mut_ptr(),
                            length,
                        );
                    }
                    inner.stats.rx_packets += 1;
                    inner.stats.rx_bytes += length as u64;
                    received.push(frame);
                }

                inner.rx.head = ((index + 1) % E1000_RX_DESC_COUNT) as u32;
                // Return the slot: RDT points at the last hardware-owned
                // descriptor, which is now the one just processed.
                write_reg(&self.mmio, REG_RDT, index as u32);
                // SAFETY: clearing the status of the slot we just returned.
                unsafe {
                    (*descriptors.add(index)).status = 0;
                }
                iterations += 1;
            }
        }

        let count = received.len() as u32;
        if let Some((callback, user_data)) = callback {
            for frame in &received {
                callback(self.device_id, frame, user_data);
            }
        } else if count > 0 {
            klog_debug!("e1000: {} frames dropped, no rx callback", count);
            let mut inner = self.inner.lock();
            inner.stats.rx_dropped += count as u64;
        }
        count
    }

    fn set_rx_callback(&self, callback: RxCallback, user_data: usize) {
        self.inner.lock().rx_callback = Some((callback, user_data));
    }

    fn stats(&self) -> NetDeviceStats {
        self.inner.lock().stats
    }

    fn version(&self) -> DriverVersion {
        DRIVER_VERSION
    }
}

// =============================================================================
// PCI binding
// =============================================================================

const DRIVER_VERSION: DriverVersion = DriverVersion::new(1, 2);

static MATCH_RULES: [PciMatchRule; 1] = [PciMatchRule {
    vendor_id: E1000_VENDOR_INTEL,
    device_id: E1000_DEVICE_82540EM,
    base_class: PCI_CLASS_NETWORK,
    sub_class: PCI_SUBCLASS_ETHERNET,
    prog_if: crate::pci_defs::PCI_MATCH_ANY_CLASS,
}];

struct E1000Driver;

impl PciDriverOps for E1000Driver {
    fn probe(&self, info: &PciDeviceInfo) -> bool {
        info.vendor_id == E1000_VENDOR_INTEL
            && info.device_id == E1000_DEVICE_82540EM
            && info.base_class == PCI_CLASS_NETWORK
            && info.sub_class == PCI_SUBCLASS_ETHERNET
    }

    fn attach(&self, info: &PciDeviceInfo) -> Option<Box<Device>> {
        let device_id = PCI_DEVICES.allocate_id();
        let state = match E1000State::bring_up(device_id, info) {
            Ok(state) => state,
            Err(err) => {
                klog_error!("e1000: attach failed: {}", err);
                return None;
            }
        };

        let device = Box::new(Device::new(device_id, *info, E1000_DRIVER.name, DRIVER_VERSION));
        device.set_network_ops(state.clone());
        state.set_rx_callback(ethernet::rx_dispatch, 0);
        Some(device)
    }
}

static E1000_OPS: E1000Driver = E1000Driver;

/// Driver descriptor registered with the PCI bus manager at boot.
pub static E1000_DRIVER: PciDriverDesc = PciDriverDesc {
    name: "e1000",
    version: DRIVER_VERSION,
    matches: &MATCH_RULES,
    ops: &E1000_OPS,
};
