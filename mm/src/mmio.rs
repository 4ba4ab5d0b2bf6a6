//! Mapped MMIO regions with volatile accessors.
//!
//! Mapping goes through the memory service (`map_io`), which installs an
//! uncached mapping and hands back the linear address. The region keeps the
//! physical base and size so drivers can log and bounds-check accesses.

use core::ptr::{read_volatile, write_volatile};

use exos_abi::addr::{PhysAddr, VirtAddr};
use exos_lib::kernel_services::memory;

/// A mapped memory-mapped I/O window.
#[derive(Clone, Copy, Debug)]
pub struct MmioRegion {
    virt_base: u64,
    phys_base: u64,
    size: usize,
}

impl MmioRegion {
    pub const fn empty() -> Self {
        Self {
            virt_base: 0,
            phys_base: 0,
            size: 0,
        }
    }

    /// Map `size` bytes of physical MMIO space, uncached.
    ///
    /// Returns `None` for a null/zero request or if the memory manager
    /// cannot establish the mapping.
    pub fn map(phys: PhysAddr, size: usize) -> Option<Self> {
        if phys.is_null() || size == 0 {
            return None;
        }
        let virt = memory::map_io(phys.as_u64(), size);
        if virt == 0 {
            return None;
        }
        Some(Self {
            virt_base: virt,
            phys_base: phys.as_u64(),
            size,
        })
    }

    #[inline]
    pub const fn is_mapped(&self) -> bool {
        self.virt_base != 0
    }

    #[inline]
    pub const fn phys_base(&self) -> PhysAddr {
        PhysAddr::new(self.phys_base)
    }

    #[inline]
    pub const fn virt_base(&self) -> VirtAddr {
        VirtAddr::new(self.virt_base)
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Volatile 32-bit register read at a byte offset.
    ///
    /// # Safety
    ///
    /// `offset` must be inside the region and naturally aligned; reading a
    /// device register can have side effects the caller must expect.
    #[inline]
    pub unsafe fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size);
        read_volatile((self.virt_base as usize + offset) as *const u32)
    }

    /// Volatile 32-bit register write at a byte offset.
    ///
    /// # Safety
    ///
    /// Same contract as [`MmioRegion::read32`].
    #[inline]
    pub unsafe fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size);
        write_volatile((self.virt_base as usize + offset) as *mut u32, value);
    }
}
