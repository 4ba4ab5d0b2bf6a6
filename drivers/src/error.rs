//! Driver-level error taxonomy.

use core::fmt;

/// Errors reported at driver and stack boundaries.
///
/// Ingress parse failures are *not* represented here: invalid packets are
/// dropped and logged, never turned into an error for the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverError {
    /// Invalid input from the caller.
    BadParameter,
    /// Operation blocked by policy (e.g. write to a read-only disk).
    NoPermission,
    /// Transient kernel resource exhaustion (allocator, cache add).
    Unexpected,
    /// The driver does not implement the requested function.
    NotImplemented,
    /// The driver reported a transmission failure.
    NetTxFail,
    /// The operation cannot complete synchronously (resolution in flight).
    Pending,
    /// A bounded wait elapsed.
    Timeout,
    /// A checksum did not validate; the packet was dropped.
    ChecksumMismatch,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadParameter => write!(f, "bad parameter"),
            Self::NoPermission => write!(f, "operation not permitted"),
            Self::Unexpected => write!(f, "resource exhausted"),
            Self::NotImplemented => write!(f, "not implemented"),
            Self::NetTxFail => write!(f, "transmit failed"),
            Self::Pending => write!(f, "operation pending"),
            Self::Timeout => write!(f, "timed out"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
        }
    }
}
