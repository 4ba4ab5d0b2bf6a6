//! Per-owner publish/subscribe registry.
//!
//! Each subsystem context (ARP, IPv4, a TCP connection) owns a
//! [`NotificationContext`] and dispatches events to whoever registered for
//! them. Dispatch is synchronous on the caller's execution context, and
//! listeners must not retain references into the event payload.
//!
//! The event payload is a caller-defined sum type implementing
//! [`EventKind`]; matching happens on the numeric kind so a listener can
//! subscribe to one variant without naming the payload.
//!
//! Owners that dispatch while holding a lock deadlock the moment a listener
//! re-enters the subsystem; collect events under the lock and send them
//! after releasing it.

extern crate alloc;

use alloc::vec::Vec;

/// Implemented by event payload enums; `kind` discriminates variants with a
/// stable numeric ID (the ABI event numbers).
pub trait EventKind {
    fn kind(&self) -> u32;
}

/// Listener callback: the event payload plus the opaque word stored at
/// registration time.
pub type NotifyCallback<E> = fn(&E, usize);

struct NotifyEntry<E> {
    kind: u32,
    callback: NotifyCallback<E>,
    user_data: usize,
}

/// Unordered collection of `(event kind, callback, user data)` entries.
///
/// No internal locking: contexts live inside their owner's mutex.
pub struct NotificationContext<E: EventKind> {
    entries: Vec<NotifyEntry<E>>,
}

impl<E: EventKind> NotificationContext<E> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a listener for `kind`. Registering an exact duplicate triple
    /// is a no-op; returns whether the entry was added.
    pub fn register(&mut self, kind: u32, callback: NotifyCallback<E>, user_data: usize) -> bool {
        if self.is_registered(kind, callback, user_data) {
            return false;
        }
        self.entries.push(NotifyEntry {
            kind,
            callback,
            user_data,
        });
        true
    }

    /// Remove a listener. Succeeds only for the exact registered triple.
    pub fn unregister(&mut self, kind: u32, callback: NotifyCallback<E>, user_data: usize) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| {
            !(e.kind == kind && e.callback as usize == callback as usize && e.user_data == user_data)
        });
        self.entries.len() != before
    }

    pub fn is_registered(&self, kind: u32, callback: NotifyCallback<E>, user_data: usize) -> bool {
        self.entries.iter().any(|e| {
            e.kind == kind && e.callback as usize == callback as usize && e.user_data == user_data
        })
    }

    /// Invoke every listener whose kind matches the event. Returns the
    /// number of listeners called.
    pub fn send(&self, event: &E) -> u32 {
        let kind = event.kind();
        let mut delivered = 0;
        for entry in self.entries.iter().filter(|e| e.kind == kind) {
            (entry.callback)(event, entry.user_data);
            delivered += 1;
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<E: EventKind> Default for NotificationContext<E> {
    fn default() -> Self {
        Self::new()
    }
}
