//! Holder for a lazily-registered `&'static` service table.

use core::sync::atomic::{AtomicPtr, Ordering};

/// A cell that starts empty and is filled once (or re-filled by tests) with
/// a `&'static` table of function pointers.
pub struct ServiceCell<T: 'static> {
    name: &'static str,
    table: AtomicPtr<T>,
}

impl<T: 'static> ServiceCell<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            table: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    pub fn register(&self, table: &'static T) {
        self.table
            .store(table as *const T as *mut T, Ordering::Release);
    }

    pub fn is_registered(&self) -> bool {
        !self.table.load(Ordering::Acquire).is_null()
    }

    /// Fetch the registered table.
    ///
    /// Calling a service before its collaborator registered it is a boot
    /// ordering bug; there is nothing sensible to fall back to.
    pub fn get(&self) -> &'static T {
        let ptr = self.table.load(Ordering::Acquire);
        if ptr.is_null() {
            panic!("kernel service table '{}' not registered", self.name);
        }
        // SAFETY: only `register` stores into the cell, and it stores a
        // `&'static T`.
        unsafe { &*ptr }
    }
}

// SAFETY: the cell only hands out shared references to 'static data.
unsafe impl<T: Sync> Sync for ServiceCell<T> {}
unsafe impl<T: Send> Send for ServiceCell<T> {}
