//! Driver dispatch ABI.
//!
//! Inside the kernel, drivers are called through the `NetworkDriver` /
//! `BlockDriver` traits. This module pins down the numeric function IDs and
//! records that cross the syscall boundary, where a trait object cannot go.

use bitflags::bitflags;

/// Function IDs of the single-entry-point driver dispatch ABI.
///
/// Generic IDs occupy 0x0000_xxxx, network driver IDs 0x0001_xxxx and
/// storage driver IDs 0x0002_xxxx.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriverFunction {
    Load = 0x0000_0001,
    Unload = 0x0000_0002,
    Probe = 0x0000_0003,
    GetVersion = 0x0000_0004,

    NetReset = 0x0001_0001,
    NetGetInfo = 0x0001_0002,
    NetSend = 0x0001_0003,
    NetPoll = 0x0001_0004,
    NetSetRxCallback = 0x0001_0005,

    DiskRead = 0x0002_0001,
    DiskWrite = 0x0002_0002,
    DiskGetInfo = 0x0002_0003,
    DiskSetAccess = 0x0002_0004,
}

impl DriverFunction {
    /// Parse a raw function ID from the dispatch boundary.
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0x0000_0001 => Some(Self::Load),
            0x0000_0002 => Some(Self::Unload),
            0x0000_0003 => Some(Self::Probe),
            0x0000_0004 => Some(Self::GetVersion),
            0x0001_0001 => Some(Self::NetReset),
            0x0001_0002 => Some(Self::NetGetInfo),
            0x0001_0003 => Some(Self::NetSend),
            0x0001_0004 => Some(Self::NetPoll),
            0x0001_0005 => Some(Self::NetSetRxCallback),
            0x0002_0001 => Some(Self::DiskRead),
            0x0002_0002 => Some(Self::DiskWrite),
            0x0002_0003 => Some(Self::DiskGetInfo),
            0x0002_0004 => Some(Self::DiskSetAccess),
            _ => None,
        }
    }
}

/// Driver version reported through [`DriverFunction::GetVersion`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DriverVersion {
    pub major: u16,
    pub minor: u16,
}

impl DriverVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

bitflags! {
    /// Disk access policy bits.
    ///
    /// A disk without [`DiskAccess::WRITE`] rejects write commands with a
    /// permission error.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DiskAccess: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl DiskAccess {
    /// Default policy: read and write allowed.
    pub const FULL: Self = Self::READ.union(Self::WRITE);

    #[inline]
    pub const fn is_read_only(self) -> bool {
        !self.contains(Self::WRITE)
    }
}

impl Default for DiskAccess {
    fn default() -> Self {
        Self::FULL
    }
}
