//! Memory services: physical pages, MMIO mapping, direct-map offset.
//!
//! Registered by the memory manager. Addresses cross this boundary as raw
//! `u64`; `exos-mm` wraps them back into the typed forms.

crate::define_service! {
    memory => MemoryServices {
        alloc_page() -> u64;
        free_page(phys: u64);
        map_io(phys: u64, len: usize) -> u64;
        phys_offset() -> u64;
    }
}
