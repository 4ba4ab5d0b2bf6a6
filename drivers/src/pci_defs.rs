//! PCI constants, configuration-space layout, and the device snapshot record.

use bitflags::bitflags;

pub const PCI_MAX_BUSES: usize = 256;
pub const PCI_MAX_DEVICES_PER_BUS: u8 = 32;
pub const PCI_MAX_FUNCTIONS: u8 = 8;
pub const PCI_BAR_COUNT: usize = 6;

/// Upper bound on capability-list traversal; a sane list is far shorter,
/// a broken one must not hang the kernel.
pub const PCI_CAP_MAX_ITERATIONS: u32 = 48;

pub const PCI_CAP_ID_MSI: u8 = 0x05;

// ---------------------------------------------------------------------------
// Configuration space offsets (type 0 header)
// ---------------------------------------------------------------------------

pub const PCI_REG_VENDOR_ID: u8 = 0x00;
pub const PCI_REG_DEVICE_ID: u8 = 0x02;
pub const PCI_REG_COMMAND: u8 = 0x04;
pub const PCI_REG_STATUS: u8 = 0x06;
pub const PCI_REG_REVISION: u8 = 0x08;
pub const PCI_REG_PROG_IF: u8 = 0x09;
pub const PCI_REG_SUBCLASS: u8 = 0x0A;
pub const PCI_REG_BASECLASS: u8 = 0x0B;
pub const PCI_REG_HEADER_TYPE: u8 = 0x0E;
pub const PCI_REG_BAR0: u8 = 0x10;
pub const PCI_REG_CAP_PTR: u8 = 0x34;
pub const PCI_REG_IRQ_LINE: u8 = 0x3C;
pub const PCI_REG_IRQ_PIN: u8 = 0x3D;

/// Vendor ID read from an absent function.
pub const PCI_VENDOR_NONE: u16 = 0xFFFF;

/// Multi-function bit in the header-type byte.
pub const PCI_HEADER_TYPE_MULTIFUNCTION: u8 = 0x80;

bitflags! {
    /// COMMAND register bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PciCommand: u16 {
        const IO_SPACE   = 1 << 0;
        const MEM_SPACE  = 1 << 1;
        const BUS_MASTER = 1 << 2;
        const INTX_DISABLE = 1 << 10;
    }
}

/// STATUS bit: the function implements a capability list.
pub const PCI_STATUS_CAP_LIST: u16 = 1 << 4;

// ---------------------------------------------------------------------------
// BAR decoding
// ---------------------------------------------------------------------------

/// Bit 0 of a BAR: 1 = I/O space, 0 = memory space.
pub const PCI_BAR_IO_SPACE: u32 = 1 << 0;
/// Memory BAR type field (bits 1-2): 0b10 = 64-bit.
pub const PCI_BAR_MEM_TYPE_MASK: u32 = 0x6;
pub const PCI_BAR_MEM_TYPE_64: u32 = 0x4;
/// Address bits of a memory BAR.
pub const PCI_BAR_MEM_MASK: u32 = 0xFFFF_FFF0;
/// Address bits of an I/O BAR.
pub const PCI_BAR_IO_MASK: u32 = 0xFFFF_FFFC;

// ---------------------------------------------------------------------------
// Class codes used by this kernel
// ---------------------------------------------------------------------------

pub const PCI_CLASS_MASS_STORAGE: u8 = 0x01;
pub const PCI_CLASS_NETWORK: u8 = 0x02;
pub const PCI_SUBCLASS_ETHERNET: u8 = 0x00;
pub const PCI_SUBCLASS_IDE: u8 = 0x01;

// ---------------------------------------------------------------------------
// Match rules
// ---------------------------------------------------------------------------

/// Wildcard for the 16-bit fields of a match rule.
pub const PCI_MATCH_ANY_ID: u16 = 0xFFFF;
/// Wildcard for the 8-bit class fields of a match rule.
pub const PCI_MATCH_ANY_CLASS: u8 = 0xFF;

/// One row of a driver's match table. A match succeeds when every
/// non-wildcard field equals the device's field.
#[derive(Clone, Copy, Debug)]
pub struct PciMatchRule {
    pub vendor_id: u16,
    pub device_id: u16,
    pub base_class: u8,
    pub sub_class: u8,
    pub prog_if: u8,
}

impl PciMatchRule {
    /// Rule that matches everything.
    pub const fn any() -> Self {
        Self {
            vendor_id: PCI_MATCH_ANY_ID,
            device_id: PCI_MATCH_ANY_ID,
            base_class: PCI_MATCH_ANY_CLASS,
            sub_class: PCI_MATCH_ANY_CLASS,
            prog_if: PCI_MATCH_ANY_CLASS,
        }
    }

    /// Rule keyed on vendor and device only.
    pub const fn id(vendor_id: u16, device_id: u16) -> Self {
        Self {
            vendor_id,
            device_id,
            base_class: PCI_MATCH_ANY_CLASS,
            sub_class: PCI_MATCH_ANY_CLASS,
            prog_if: PCI_MATCH_ANY_CLASS,
        }
    }

    pub fn matches(&self, info: &PciDeviceInfo) -> bool {
        (self.vendor_id == PCI_MATCH_ANY_ID || self.vendor_id == info.vendor_id)
            && (self.device_id == PCI_MATCH_ANY_ID || self.device_id == info.device_id)
            && (self.base_class == PCI_MATCH_ANY_CLASS || self.base_class == info.base_class)
            && (self.sub_class == PCI_MATCH_ANY_CLASS || self.sub_class == info.sub_class)
            && (self.prog_if == PCI_MATCH_ANY_CLASS || self.prog_if == info.prog_if)
    }
}

// ---------------------------------------------------------------------------
// Device snapshot
// ---------------------------------------------------------------------------

/// Everything the enumerator reads out of one present function.
///
/// `bar_base` holds the decoded base address only; type bits masked off.
#[derive(Clone, Copy, Debug)]
pub struct PciDeviceInfo {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub base_class: u8,
    pub sub_class: u8,
    pub prog_if: u8,
    pub revision: u8,
    pub header_type: u8,
    pub bar: [u32; PCI_BAR_COUNT],
    pub bar_base: [u32; PCI_BAR_COUNT],
    pub irq_line: u8,
    pub irq_pin: u8,
}

impl PciDeviceInfo {
    pub const fn zeroed() -> Self {
        Self {
            bus: 0,
            device: 0,
            function: 0,
            vendor_id: 0,
            device_id: 0,
            base_class: 0,
            sub_class: 0,
            prog_if: 0,
            revision: 0,
            header_type: 0,
            bar: [0; PCI_BAR_COUNT],
            bar_base: [0; PCI_BAR_COUNT],
            irq_line: 0,
            irq_pin: 0,
        }
    }
}
