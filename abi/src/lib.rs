//! EXOS kernel ABI types.
//!
//! Canonical definitions for the values that cross stable boundaries: the
//! driver dispatch ABI, the notification event numbering, and the address
//! newtypes shared by every kernel crate. All types are `#[repr(C)]` or
//! `#[repr(transparent)]` so the layout is nailed down.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod driver;
pub mod net;

/// Standard 4 KiB page size.
pub const PAGE_SIZE: u64 = 0x1000;

pub use addr::*;
pub use driver::*;
