//! Block storage: the ATA driver and its sector cache.

pub mod ata;
pub mod sector_cache;

use exos_abi::driver::DiskAccess;

use crate::error::DriverError;

/// Sector size every path in this subsystem assumes.
pub const SECTOR_SIZE: usize = 512;

/// Snapshot returned by a block driver's GETINFO operation.
#[derive(Clone, Copy, Debug)]
pub struct DiskInfo {
    pub kind: &'static str,
    pub sector_count: u64,
    pub access: DiskAccess,
}

/// Operations every block driver provides.
pub trait BlockDriver: Send + Sync {
    /// Read one sector into `out`.
    fn read(&self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> Result<(), DriverError>;

    /// Write one sector. Fails with [`DriverError::NoPermission`] on a disk
    /// without write access.
    fn write(&self, sector: u64, data: &[u8; SECTOR_SIZE]) -> Result<(), DriverError>;

    fn info(&self) -> DiskInfo;

    fn set_access(&self, access: DiskAccess);
}
