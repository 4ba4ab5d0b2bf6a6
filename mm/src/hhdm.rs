//! Direct-map (higher-half) address translation.
//!
//! The memory manager maps all of physical memory at a fixed offset; DMA
//! code uses these helpers to move between the two views.

use exos_abi::addr::{PhysAddr, VirtAddr};
use exos_lib::kernel_services::memory;

/// Translate a physical address into the direct map.
#[inline]
pub fn phys_to_virt(phys: PhysAddr) -> VirtAddr {
    VirtAddr::new(phys.as_u64().wrapping_add(memory::phys_offset()))
}

/// Translate a direct-map virtual address back to physical.
///
/// Only valid for addresses produced by [`phys_to_virt`] (or otherwise known
/// to live inside the direct map).
#[inline]
pub fn virt_to_phys(virt: VirtAddr) -> PhysAddr {
    PhysAddr::new(virt.as_u64().wrapping_sub(memory::phys_offset()))
}
