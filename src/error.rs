//! # Error Types
//!
//! This module defines the closed error taxonomy used throughout the martel
//! library. Every port or encoder operation either succeeds or fails with
//! exactly one of these kinds, and each [`Port`](crate::port::Port) records
//! the outcome of its most recent operation so batch sequences can defer
//! checking.
//!
//! The kinds are deliberately payload-free: callers branch on the kind, and
//! the rendered message is a stable, human-readable sentence suitable for a
//! spooler's error log.

use thiserror::Error;

/// Result alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, MartelError>;

/// Main error type for martel operations.
///
/// The set is closed: backends never invent new failure kinds, and no
/// operation silently downgrades a failure to success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MartelError {
    /// Operation has no meaningful implementation on this port type
    #[error("Function not implemented")]
    NotImplemented,

    /// Low-level input/output error (ioctl, termios, select)
    #[error("Low-level input/output error")]
    Io,

    /// Unknown printer model
    #[error("Invalid model parameter")]
    InvalidModel,

    /// Unknown printer model type
    #[error("Invalid model type parameter")]
    InvalidModelType,

    /// Operation requires a port of a different type
    #[error("Invalid port type parameter")]
    InvalidPortType,

    /// Device name exceeds the fixed maximum
    #[error("Name or string too long")]
    NameTooLong,

    /// Device URI is malformed or too large to serialize
    #[error("Invalid URI parameter")]
    InvalidUri,

    /// Baudrate is not one of the eight supported values
    #[error("Invalid baudrate parameter")]
    InvalidBaudrate,

    /// Handshake is not one of none/xonxoff/rtscts
    #[error("Invalid handshake parameter")]
    InvalidHandshake,

    /// Timeout value is out of range
    #[error("Invalid timeout parameter")]
    InvalidTimeout,

    /// Could not acquire the device node
    #[error("Open operation failed")]
    OpenFailed,

    /// Could not release the device node
    #[error("Close operation failed")]
    CloseFailed,

    /// OS-level write failure
    #[error("Write operation failed")]
    WriteFailed,

    /// Write did not complete within the configured timeout
    #[error("Write operation timed out")]
    WriteTimeout,

    /// OS-level read failure
    #[error("Read operation failed")]
    ReadFailed,

    /// Read did not complete within the configured timeout
    #[error("Read operation timed out")]
    ReadTimeout,

    /// Drain of the output queue failed
    #[error("Sync operation failed")]
    SyncFailed,

    /// Discard of the device queues failed
    #[error("Flush operation failed")]
    FlushFailed,

    /// Printer status buffer is malformed
    #[error("Invalid status buffer")]
    InvalidStatus,

    /// Operation requires an open port
    #[error("Port is not open")]
    PortNotOpen,

    /// Port is already open
    #[error("Port is already open")]
    PortAlreadyOpen,

    /// Parallel mode is not one of poll/irq
    #[error("Invalid parallel mode parameter")]
    InvalidParallelMode,

    /// USB device path is malformed
    #[error("Invalid USB path")]
    InvalidUsbPath,

    /// USB device node does not exist
    #[error("USB device not found")]
    UsbDeviceNotFound,

    /// USB device node is held by another process or driver
    #[error("USB device busy")]
    UsbDeviceBusy,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_stable() {
        assert_eq!(MartelError::PortNotOpen.to_string(), "Port is not open");
        assert_eq!(
            MartelError::WriteTimeout.to_string(),
            "Write operation timed out"
        );
        assert_eq!(
            MartelError::InvalidBaudrate.to_string(),
            "Invalid baudrate parameter"
        );
    }

    #[test]
    fn test_kinds_compare_by_value() {
        // last_error bookkeeping relies on cheap copyable comparisons
        let e = MartelError::OpenFailed;
        let copy = e;
        assert_eq!(e, copy);
        assert_ne!(e, MartelError::CloseFailed);
    }
}
