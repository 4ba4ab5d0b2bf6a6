//! Generic device objects and the global PCI device list.
//!
//! A [`Device`] is what a successful driver attach produces: the PCI
//! function snapshot, the bound driver's identity, and a small typed context
//! map where protocol layers hang their per-device state (ARP cache, IPv4
//! context, ...). Contexts are reached by [`ContextTag`] under the device
//! mutex; what comes back is a shared handle whose own lock governs the
//! context's interior, so per-device protocol state never crosses devices.
//!
//! Devices are owned by the global registry and referenced everywhere else
//! by [`DeviceId`], with no back-pointer graphs to tear down.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use exos_abi::driver::DriverVersion;
use exos_lib::IrqMutex;

use crate::net::netdev::NetworkDriver;
use crate::pci_defs::PciDeviceInfo;

/// Stable handle for a registered device.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tags of the typed per-device context map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ContextTag {
    Arp = 0,
    Ipv4 = 1,
    Tcp = 2,
}

const CONTEXT_SLOTS: usize = 3;

struct DeviceInner {
    driver_name: &'static str,
    driver_version: DriverVersion,
    net_ops: Option<Arc<dyn NetworkDriver>>,
    contexts: [Option<Arc<dyn Any + Send + Sync>>; CONTEXT_SLOTS],
}

/// A bound device: bus snapshot, driver identity, context map.
pub struct Device {
    id: DeviceId,
    pci: PciDeviceInfo,
    inner: IrqMutex<DeviceInner>,
}

impl Device {
    pub fn new(
        id: DeviceId,
        pci: PciDeviceInfo,
        driver_name: &'static str,
        driver_version: DriverVersion,
    ) -> Self {
        Self {
            id,
            pci,
            inner: IrqMutex::new(DeviceInner {
                driver_name,
                driver_version,
                net_ops: None,
                contexts: [const { None }; CONTEXT_SLOTS],
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Copy of the PCI function snapshot taken at enumeration time.
    #[inline]
    pub fn pci_info(&self) -> PciDeviceInfo {
        self.pci
    }

    pub fn driver_name(&self) -> &'static str {
        self.inner.lock().driver_name
    }

    pub fn driver_version(&self) -> DriverVersion {
        self.inner.lock().driver_version
    }

    /// Install the network operations of the bound driver.
    pub fn set_network_ops(&self, ops: Arc<dyn NetworkDriver>) {
        self.inner.lock().net_ops = Some(ops);
    }

    /// The network operations, if this device is a NIC.
    pub fn network(&self) -> Option<Arc<dyn NetworkDriver>> {
        self.inner.lock().net_ops.clone()
    }

    /// Fetch a typed context. `None` if the slot is empty or holds another
    /// type.
    pub fn get_context<T: Any + Send + Sync>(&self, tag: ContextTag) -> Option<Arc<T>> {
        let inner = self.inner.lock();
        let ctx = inner.contexts[tag as usize].clone()?;
        drop(inner);
        ctx.downcast::<T>().ok()
    }

    /// Fetch a typed context, creating it with `init` if the slot is empty.
    ///
    /// `init` runs without the device lock held, so context constructors are
    /// free to query the device (driver info, network operations). A lost
    /// creation race keeps the first-installed context.
    pub fn get_or_create_context<T: Any + Send + Sync>(
        &self,
        tag: ContextTag,
        init: impl FnOnce() -> Arc<T>,
    ) -> Arc<T> {
        if let Some(existing) = self.get_context::<T>(tag) {
            return existing;
        }

        let created = init();
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.contexts[tag as usize].clone() {
            if let Ok(typed) = existing.downcast::<T>() {
                return typed;
            }
        }
        inner.contexts[tag as usize] = Some(created.clone());
        created
    }

    /// Drop a context, releasing everything it owns.
    pub fn remove_context(&self, tag: ContextTag) {
        self.inner.lock().contexts[tag as usize] = None;
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device {{ id={}, {:04x}:{:04x} at {:02x}:{:02x}.{} }}",
            self.id,
            self.pci.vendor_id,
            self.pci.device_id,
            self.pci.bus,
            self.pci.device,
            self.pci.function
        )
    }
}

// =============================================================================
// Device registry
// =============================================================================

/// Owner of every attached PCI device.
pub struct DeviceRegistry {
    devices: IrqMutex<Vec<Arc<Device>>>,
    next_id: AtomicU32,
}

/// The global PCI device list. Mutated only from kernel tasks.
pub static PCI_DEVICES: DeviceRegistry = DeviceRegistry::new();

impl DeviceRegistry {
    pub const fn new() -> Self {
        Self {
            devices: IrqMutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Reserve the ID the next attached device will carry.
    pub fn allocate_id(&self) -> DeviceId {
        DeviceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Take ownership of a freshly attached device.
    pub fn register(&self, device: Box<Device>) -> Arc<Device> {
        let device: Arc<Device> = Arc::from(device);
        self.devices.lock().push(device.clone());
        device
    }

    pub fn by_id(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices.lock().iter().find(|d| d.id == id).cloned()
    }

    /// Snapshot of all registered devices.
    pub fn list(&self) -> Vec<Arc<Device>> {
        self.devices.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.devices.lock().len()
    }

    /// Test-only: forget every device.
    pub fn reset(&self) {
        self.devices.lock().clear();
    }
}
