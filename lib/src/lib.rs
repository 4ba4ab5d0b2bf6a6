#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod adaptive_delay;
pub mod cpu;
pub mod hysteresis;
pub mod init_flag;
pub mod io;
pub mod kernel_services;
pub mod klog;
pub mod notification;
pub mod ports;
pub mod ring_buffer;
pub mod spinlock;
pub mod testing;

#[doc(hidden)]
pub use paste;

pub use adaptive_delay::AdaptiveDelay;
pub use hysteresis::Hysteresis;
pub use init_flag::InitFlag;
pub use io::Port;
pub use klog::{KlogLevel, klog_get_level, klog_register_backend, klog_set_level};
pub use notification::{EventKind, NotificationContext, NotifyCallback};
pub use ports::COM1;
pub use ring_buffer::ByteRing;
pub use spinlock::{IrqMutex, IrqMutexGuard};
