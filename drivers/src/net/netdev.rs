//! Network driver interface.
//!
//! The dispatch-table driver ABI collapses to this trait inside the kernel;
//! the numeric function IDs survive only in `exos-abi`. Implementations use
//! interior mutability: every method takes `&self` so the device context
//! map can hand the driver out as a shared handle.

use core::fmt;

use exos_abi::driver::DriverVersion;

use crate::device::DeviceId;
use crate::error::DriverError;
use crate::net::types::MacAddr;

/// Snapshot returned by the driver's GETINFO operation.
#[derive(Clone, Copy, Debug)]
pub struct NetworkInfo {
    pub mac: MacAddr,
    pub mtu: u16,
    pub link_up: bool,
}

/// Receive callback: device handle, one complete frame, registered word.
///
/// Invoked from the driver's poll path; the frame borrow ends with the call.
pub type RxCallback = fn(DeviceId, &[u8], usize);

/// Monotonic per-NIC counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetDeviceStats {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
}

impl NetDeviceStats {
    pub const fn new() -> Self {
        Self {
            rx_packets: 0,
            tx_packets: 0,
            rx_bytes: 0,
            tx_bytes: 0,
            rx_errors: 0,
            tx_errors: 0,
            rx_dropped: 0,
            tx_dropped: 0,
        }
    }
}

impl fmt::Display for NetDeviceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx: {} pkts/{} bytes, tx: {} pkts/{} bytes, err: {}/{}, drop: {}/{}",
            self.rx_packets,
            self.rx_bytes,
            self.tx_packets,
            self.tx_bytes,
            self.rx_errors,
            self.tx_errors,
            self.rx_dropped,
            self.tx_dropped
        )
    }
}

/// Operations every network driver provides.
pub trait NetworkDriver: Send + Sync {
    /// Reset the controller to a clean operational state.
    fn reset(&self) -> Result<(), DriverError>;

    /// MAC, MTU and link state.
    fn info(&self) -> NetworkInfo;

    /// Transmit one Ethernet frame. Returns [`DriverError::NetTxFail`] when
    /// the hardware did not report completion and [`DriverError::Unexpected`]
    /// when the ring is full; callers back off rather than block.
    fn send(&self, frame: &[u8]) -> Result<(), DriverError>;

    /// Drain the receive ring, invoking the RX callback per frame. Returns
    /// the number of frames delivered.
    fn poll(&self) -> u32;

    /// Install the receive callback and its opaque word.
    fn set_rx_callback(&self, callback: RxCallback, user_data: usize);

    /// Counter snapshot.
    fn stats(&self) -> NetDeviceStats;

    fn version(&self) -> DriverVersion {
        DriverVersion::new(1, 0)
    }
}
