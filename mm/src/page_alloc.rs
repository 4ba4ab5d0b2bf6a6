//! Physical page allocation for DMA rings and buffers.

use core::ptr;

use exos_abi::addr::{PhysAddr, VirtAddr};
use exos_abi::PAGE_SIZE;
use exos_lib::kernel_services::memory;

use crate::hhdm;

/// Allocate one physical page. Null on exhaustion.
#[inline]
pub fn alloc_page_frame() -> PhysAddr {
    PhysAddr::new(memory::alloc_page())
}

/// Return a page to the allocator.
#[inline]
pub fn free_page_frame(phys: PhysAddr) {
    if !phys.is_null() {
        memory::free_page(phys.as_u64());
    }
}

/// RAII wrapper tying a physical page's lifetime to a value.
///
/// Descriptor rings and per-slot DMA buffers hold these; dropping the ring
/// returns its pages.
///
/// # Safety
///
/// Users must not access the page after the frame drops, and must not leak
/// the physical address to hardware that outlives it.
pub struct OwnedPageFrame {
    phys: PhysAddr,
}

impl OwnedPageFrame {
    /// Allocate a page. `None` on exhaustion.
    #[inline]
    pub fn alloc() -> Option<Self> {
        let phys = alloc_page_frame();
        if phys.is_null() {
            None
        } else {
            Some(Self { phys })
        }
    }

    /// Allocate a zeroed page, the common pattern for DMA memory that must
    /// start in a known state.
    pub fn alloc_zeroed() -> Option<Self> {
        let frame = Self::alloc()?;
        // SAFETY: the frame was just allocated and is exclusively ours; the
        // direct-map pointer covers the full page.
        unsafe {
            ptr::write_bytes(frame.as_mut_ptr::<u8>(), 0, PAGE_SIZE as usize);
        }
        Some(frame)
    }

    #[inline]
    pub fn phys_addr(&self) -> PhysAddr {
        self.phys
    }

    #[inline]
    pub fn phys_u64(&self) -> u64 {
        self.phys.as_u64()
    }

    /// Direct-map virtual address of this page.
    #[inline]
    pub fn virt_addr(&self) -> VirtAddr {
        hhdm::phys_to_virt(self.phys)
    }

    /// Typed mutable pointer into the page.
    ///
    /// Valid only while this frame is alive; caller synchronises access.
    #[inline]
    pub fn as_mut_ptr<T>(&self) -> *mut T {
        self.virt_addr().as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr<T>(&self) -> *const T {
        self.virt_addr().as_ptr()
    }
}

impl Drop for OwnedPageFrame {
    fn drop(&mut self) {
        free_page_frame(self.phys);
    }
}
