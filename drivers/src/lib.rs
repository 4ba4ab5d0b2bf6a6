#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod device;
pub mod error;
pub mod net;
pub mod pci;
pub mod pci_defs;
pub mod platform_init;
pub mod storage;
pub mod test_fixtures;

pub mod arp_tests;
pub mod ata_tests;
pub mod checksum_tests;
pub mod config_tests;
pub mod e1000_tests;
pub mod pci_tests;
pub mod sector_cache_tests;
pub mod tcp_tests;
pub mod util_tests;

pub use error::DriverError;
