//! ATA disk driver (CHS PIO, sector at a time).
//!
//! Identification probes both legacy channels and both drive-select bits;
//! a drive whose reported geometry is sane gets an [`AtaDisk`] with its own
//! sector cache and joins the global disk list. Reads and writes go through
//! the cache; the physical transfer happens under the disk lock, which also
//! keeps interrupts off for the duration of the port I/O.
//!
//! The shared IRQ is enabled only when at least one drive exists, and its
//! handler is diagnostic: it validates the status register and logs. The
//! read/write path stays synchronous.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use exos_abi::driver::{DiskAccess, DriverVersion};
use exos_lib::io::Port;
use exos_lib::kernel_services::platform;
use exos_lib::ports::{ATA_PRIMARY_IO, ATA_PRIMARY_IRQ, ATA_SECONDARY_IO, ATA_SECONDARY_IRQ};
use exos_lib::{IrqMutex, klog_debug, klog_info, klog_warn};

use crate::error::DriverError;
use crate::storage::sector_cache::{SectorBuffer, SectorCache};
use crate::storage::{BlockDriver, DiskInfo, SECTOR_SIZE};

pub const ATA_DRIVER_VERSION: DriverVersion = DriverVersion::new(1, 0);

// Task file register offsets from the channel base.
const REG_DATA: u16 = 0x00;
const REG_ERROR: u16 = 0x01;
const REG_SECTOR_COUNT: u16 = 0x02;
const REG_SECTOR: u16 = 0x03;
const REG_CYLINDER_LOW: u16 = 0x04;
const REG_CYLINDER_HIGH: u16 = 0x05;
const REG_HEAD: u16 = 0x06;
const REG_STATUS: u16 = 0x07;
const REG_COMMAND: u16 = 0x07;

const STATUS_ERROR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;
const STATUS_READY: u8 = 0x40;
const STATUS_BUSY: u8 = 0x80;

const COMMAND_READ: u8 = 0x20;
const COMMAND_WRITE: u8 = 0x30;
const COMMAND_IDENTIFY: u8 = 0xEC;

/// Fixed bits of the drive/head register: 101DHHHH.
const HEAD_SELECT_BASE: u8 = 0xA0;

/// Iteration budget for the status spins.
const WAIT_ITERATIONS: u32 = 100_000;
/// Wall-clock ceiling paired with the iteration budget.
const WAIT_DEADLINE_MS: u64 = 500;

/// Per-disk sector cache capacity.
pub const SECTOR_CACHE_ENTRIES: usize = 64;
/// Cached sector lifetime.
pub const SECTOR_CACHE_TTL_MS: u64 = 2000;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// CHS geometry reported by IDENTIFY.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiskGeometry {
    pub cylinders: u32,
    pub heads: u32,
    pub sectors_per_track: u32,
}

impl DiskGeometry {
    #[inline]
    pub const fn sector_count(&self) -> u64 {
        self.cylinders as u64 * self.heads as u64 * self.sectors_per_track as u64
    }

    /// A geometry is usable only if every axis is non-zero.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.cylinders != 0 && self.heads != 0 && self.sectors_per_track != 0
    }
}

/// CHS coordinates of one sector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChsParams {
    pub cylinder: u32,
    pub head: u32,
    pub sector: u32,
}

/// Translate a linear sector number into CHS coordinates.
pub const fn sector_to_chs(geometry: &DiskGeometry, sector: u32) -> ChsParams {
    let per_cylinder = geometry.heads * geometry.sectors_per_track;
    let cylinder = sector / per_cylinder;
    let remainder = sector % per_cylinder;
    ChsParams {
        cylinder,
        head: remainder / geometry.sectors_per_track,
        sector: remainder % geometry.sectors_per_track + 1,
    }
}

/// Pull the CHS geometry out of a raw IDENTIFY sector.
pub fn geometry_from_identify(data: &[u8; SECTOR_SIZE]) -> DiskGeometry {
    let word = |index: usize| u16::from_le_bytes([data[index * 2], data[index * 2 + 1]]) as u32;
    DiskGeometry {
        cylinders: word(1),
        heads: word(3),
        sectors_per_track: word(6),
    }
}

// ---------------------------------------------------------------------------
// Channel I/O
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Channel {
    base: u16,
}

impl Channel {
    #[inline]
    fn port8(&self, offset: u16) -> Port<u8> {
        Port::new(self.base + offset)
    }

    #[inline]
    fn data_port(&self) -> Port<u16> {
        Port::new(self.base + REG_DATA)
    }

    fn status(&self) -> u8 {
        // SAFETY: reading the channel status register has no side effects
        // beyond clearing the IRQ latch, which the polled path tolerates.
        unsafe { self.port8(REG_STATUS).read() }
    }

    /// Spin until BUSY clears; iteration and wall-clock bounded.
    fn wait_not_busy(&self) -> bool {
        let deadline = platform::get_time_ms() + WAIT_DEADLINE_MS;
        for _ in 0..WAIT_ITERATIONS {
            if self.status() & STATUS_BUSY == 0 {
                return true;
            }
            if platform::get_time_ms() > deadline {
                break;
            }
            core::hint::spin_loop();
        }
        klog_warn!("ata: busy wait timed out on port {:#x}", self.base);
        false
    }

    /// Spin until the drive is ready to move data: READY, not BUSY, DRQ.
    fn wait_data_ready(&self) -> bool {
        let deadline = platform::get_time_ms() + WAIT_DEADLINE_MS;
        for _ in 0..WAIT_ITERATIONS {
            let status = self.status();
            if status & STATUS_BUSY == 0 && status & STATUS_READY != 0 && status & STATUS_DRQ != 0 {
                return true;
            }
            if platform::get_time_ms() > deadline {
                break;
            }
            core::hint::spin_loop();
        }
        klog_warn!("ata: data wait timed out on port {:#x}", self.base);
        false
    }

    /// Program the task file for a CHS transfer and issue `command`.
    fn issue(&self, drive: u8, command: u8, chs: ChsParams, count: u8) -> bool {
        if !self.wait_not_busy() {
            return false;
        }
        // SAFETY: task-file writes on a present channel; the caller holds
        // the disk lock, which keeps interrupts disabled.
        unsafe {
            self.port8(REG_CYLINDER_LOW).write(chs.cylinder as u8);
            self.port8(REG_CYLINDER_HIGH).write((chs.cylinder >> 8) as u8);
            self.port8(REG_HEAD)
                .write(HEAD_SELECT_BASE | (drive << 4) | (chs.head as u8 & 0x0F));
            self.port8(REG_SECTOR).write(chs.sector as u8);
            self.port8(REG_SECTOR_COUNT).write(count);
            self.port8(REG_COMMAND).write(command);
        }
        true
    }

    /// Stream one sector from the data register.
    fn read_sector_data(&self, out: &mut [u8; SECTOR_SIZE]) {
        let data = self.data_port();
        for chunk in out.chunks_exact_mut(2) {
            // SAFETY: DRQ was confirmed; the drive expects exactly 256 reads.
            let word = unsafe { data.read() };
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Stream one sector into the data register.
    fn write_sector_data(&self, data_in: &[u8; SECTOR_SIZE]) {
        let data = self.data_port();
        for chunk in data_in.chunks_exact(2) {
            // SAFETY: DRQ was confirmed; the drive expects exactly 256 writes.
            unsafe { data.write(u16::from_le_bytes([chunk[0], chunk[1]])) };
        }
    }
}

// ---------------------------------------------------------------------------
// Disk object
// ---------------------------------------------------------------------------

struct AtaDiskInner {
    access: DiskAccess,
    cache: SectorCache,
}

/// One identified ATA drive.
pub struct AtaDisk {
    channel: Channel,
    drive: u8,
    irq: u8,
    geometry: DiskGeometry,
    inner: IrqMutex<AtaDiskInner>,
}

impl AtaDisk {
    pub fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    pub fn irq(&self) -> u8 {
        self.irq
    }

    /// Read a sector through the cache.
    fn read_cached(&self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> Result<(), DriverError> {
        if sector >= self.geometry.sector_count() {
            return Err(DriverError::BadParameter);
        }

        let now = platform::get_time_ms();
        let mut inner = self.inner.lock();
        inner.cache.cleanup(now);

        if let Some(hit) = inner.cache.find(|buffer| buffer.matches(sector)) {
            out.copy_from_slice(&hit.data);
            return Ok(());
        }

        let chs = sector_to_chs(&self.geometry, sector as u32);
        if !self.channel.issue(self.drive, COMMAND_READ, chs, 1) {
            return Err(DriverError::Timeout);
        }
        if !self.channel.wait_data_ready() {
            return Err(DriverError::Timeout);
        }

        let mut buffer = Box::new(SectorBuffer::new(sector));
        self.channel.read_sector_data(&mut buffer.data);
        out.copy_from_slice(&buffer.data);

        inner.cache.add(buffer, now, SECTOR_CACHE_TTL_MS)?;
        Ok(())
    }

    /// Write a sector through the cache: the cached copy is updated and
    /// marked dirty before the transfer, cleaned after it.
    fn write_cached(&self, sector: u64, data: &[u8; SECTOR_SIZE]) -> Result<(), DriverError> {
        if sector >= self.geometry.sector_count() {
            return Err(DriverError::BadParameter);
        }

        let now = platform::get_time_ms();
        let mut inner = self.inner.lock();

        if inner.access.is_read_only() {
            return Err(DriverError::NoPermission);
        }

        inner.cache.cleanup(now);

        if let Some(hit) = inner.cache.find(|buffer| buffer.matches(sector)) {
            hit.data.copy_from_slice(data);
            hit.dirty = true;
        } else {
            let mut buffer = Box::new(SectorBuffer::new(sector));
            buffer.data.copy_from_slice(data);
            buffer.dirty = true;
            inner.cache.add(buffer, now, SECTOR_CACHE_TTL_MS)?;
        }

        let chs = sector_to_chs(&self.geometry, sector as u32);
        if !self.channel.issue(self.drive, COMMAND_WRITE, chs, 1) {
            return Err(DriverError::Timeout);
        }
        if !self.channel.wait_data_ready() {
            return Err(DriverError::Timeout);
        }
        self.channel.write_sector_data(data);

        if let Some(hit) = inner.cache.find(|buffer| buffer.matches(sector)) {
            hit.dirty = false;
        }
        Ok(())
    }
}

impl BlockDriver for AtaDisk {
    fn read(&self, sector: u64, out: &mut [u8; SECTOR_SIZE]) -> Result<(), DriverError> {
        self.read_cached(sector, out)
    }

    fn write(&self, sector: u64, data: &[u8; SECTOR_SIZE]) -> Result<(), DriverError> {
        self.write_cached(sector, data)
    }

    fn info(&self) -> DiskInfo {
        DiskInfo {
            kind: "ATA HDD",
            sector_count: self.geometry.sector_count(),
            access: self.inner.lock().access,
        }
    }

    fn set_access(&self, access: DiskAccess) {
        self.inner.lock().access = access;
    }
}

// ---------------------------------------------------------------------------
// Identification and the global disk list
// ---------------------------------------------------------------------------

/// The global disk list. Mutated only from kernel tasks.
static DISK_LIST: IrqMutex<Vec<Arc<AtaDisk>>> = IrqMutex::new(Vec::new());

/// Snapshot of every identified disk.
pub fn ata_disks() -> Vec<Arc<AtaDisk>> {
    DISK_LIST.lock().clone()
}

fn identify(channel: Channel, drive: u8) -> Option<DiskGeometry> {
    if !channel.wait_not_busy() {
        return None;
    }

    // SAFETY: task-file setup for IDENTIFY; zero cylinder and head select
    // the drive in a known state.
    unsafe {
        channel.port8(REG_CYLINDER_LOW).write(0);
        channel.port8(REG_CYLINDER_HIGH).write(0);
        channel
            .port8(REG_HEAD)
            .write(HEAD_SELECT_BASE | (drive << 4));
        channel.port8(REG_COMMAND).write(COMMAND_IDENTIFY);
    }

    // An absent drive floats the status register.
    if channel.status() == 0 {
        return None;
    }
    if !channel.wait_data_ready() {
        return None;
    }
    if channel.status() & STATUS_ERROR != 0 {
        // SAFETY: reading the error register clears the condition.
        let error = unsafe { channel.port8(REG_ERROR).read() };
        klog_debug!(
            "ata: identify error {:#x} on port {:#x} drive {}",
            error,
            channel.base,
            drive
        );
        return None;
    }

    let mut data = [0u8; SECTOR_SIZE];
    channel.read_sector_data(&mut data);

    let geometry = geometry_from_identify(&data);
    geometry.is_valid().then_some(geometry)
}

/// Probe both channels and both drives; populate the disk list. The shared
/// IRQ of a channel is enabled only if a drive answered on it.
pub fn ata_init() -> usize {
    let channels = [
        (Channel { base: ATA_PRIMARY_IO }, ATA_PRIMARY_IRQ),
        (
            Channel {
                base: ATA_SECONDARY_IO,
            },
            ATA_SECONDARY_IRQ,
        ),
    ];

    let mut found = 0;
    for (channel, irq) in channels {
        let mut channel_found = 0;
        for drive in 0..2u8 {
            let Some(geometry) = identify(channel, drive) else {
                continue;
            };

            let disk = Arc::new(AtaDisk {
                channel,
                drive,
                irq,
                geometry,
                inner: IrqMutex::new(AtaDiskInner {
                    access: DiskAccess::FULL,
                    cache: SectorCache::new(SECTOR_CACHE_ENTRIES),
                }),
            });

            klog_info!(
                "ata: port {:#x} drive {} CHS {}/{}/{} ({} MiB)",
                channel.base,
                drive,
                geometry.cylinders,
                geometry.heads,
                geometry.sectors_per_track,
                geometry.sector_count() * SECTOR_SIZE as u64 / (1024 * 1024)
            );

            DISK_LIST.lock().push(disk);
            channel_found += 1;
        }

        if channel_found > 0 {
            platform::irq_unmask(irq);
        }
        found += channel_found;
    }

    if found == 0 {
        klog_info!("ata: no drives found");
    }
    found
}

/// Diagnostic IRQ handler: decide whether the interrupt looks real and log.
/// Completion signalling stays with the synchronous R/W path.
pub fn ata_irq_handler(channel_base: u16) {
    let channel = Channel { base: channel_base };
    let status = channel.status();
    if status == 0 || status == 0xFF {
        return;
    }
    if status & (STATUS_DRQ | STATUS_ERROR) != 0 {
        klog_debug!("ata: irq on port {:#x}, status {:#x}", channel_base, status);
    }
}
