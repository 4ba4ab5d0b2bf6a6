//! Well-known x86 I/O port assignments.
//!
//! Single source of truth for every fixed port the kernel touches. Device
//! drivers that own a relocatable register file (ATA channels, BAR-based
//! devices) take a base [`Port`] and derive the rest with
//! [`Port::offset`](crate::io::Port::offset).

use crate::io::Port;

pub const COM1: Port<u8> = Port::new(0x3F8);

/// Legacy PCI configuration mechanism, address register.
pub const PCI_CONFIG_ADDRESS: Port<u32> = Port::new(0xCF8);
/// Legacy PCI configuration mechanism, data register.
pub const PCI_CONFIG_DATA: Port<u32> = Port::new(0xCFC);

/// ATA primary channel command block base (task file at base..base+7).
pub const ATA_PRIMARY_IO: u16 = 0x1F0;
/// ATA secondary channel command block base.
pub const ATA_SECONDARY_IO: u16 = 0x170;
/// ATA primary channel control block (device control / alt status).
pub const ATA_PRIMARY_CTRL: u16 = 0x3F6;
/// ATA secondary channel control block.
pub const ATA_SECONDARY_CTRL: u16 = 0x376;

/// ATA shared IRQ lines (legacy routing).
pub const ATA_PRIMARY_IRQ: u8 = 14;
pub const ATA_SECONDARY_IRQ: u8 = 15;

/// Port 0x80: harmless write target used as an I/O delay.
pub const IO_DELAY: Port<u8> = Port::new(0x80);

// ---------------------------------------------------------------------------
// Raw UART output for the early klog backend
// ---------------------------------------------------------------------------

const UART_THR: u16 = 0;
const UART_LSR: u16 = 5;
const UART_LSR_TX_EMPTY: u8 = 0x20;

/// Write one byte to a UART, polling the line status register until the
/// transmit holding register is empty.
///
/// # Safety
///
/// Port I/O. `base` must be a present UART; callers serialise access.
pub unsafe fn serial_write_byte(base: Port<u8>, byte: u8) {
    let lsr = base.offset(UART_LSR);
    let thr = base.offset(UART_THR);
    while lsr.read() & UART_LSR_TX_EMPTY == 0 {
        core::hint::spin_loop();
    }
    thr.write(byte);
}

/// Write a byte slice to a UART, converting `\n` to `\r\n`.
///
/// # Safety
///
/// Same contract as [`serial_write_byte`].
pub unsafe fn serial_write_bytes(base: Port<u8>, bytes: &[u8]) {
    for &b in bytes {
        if b == b'\n' {
            serial_write_byte(base, b'\r');
        }
        serial_write_byte(base, b);
    }
}
