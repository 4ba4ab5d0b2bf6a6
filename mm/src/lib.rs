//! Memory façade for the driver and network crates.
//!
//! The real memory manager is an external collaborator; it registers the
//! memory service table at boot. This crate wraps those raw hooks back into
//! typed, RAII-friendly forms: owned page frames for DMA buffers, mapped
//! MMIO regions, and direct-map address translation.

#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod hhdm;
pub mod mmio;
pub mod page_alloc;

pub use hhdm::{phys_to_virt, virt_to_phys};
pub use mmio::MmioRegion;
pub use page_alloc::OwnedPageFrame;
