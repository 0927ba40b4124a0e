//! # Printer Ports
//!
//! This module provides the polymorphic handle unifying the three printer
//! transports behind one lifecycle and one error model.
//!
//! ## Backends
//!
//! - [`serial`]: RS-232 tty devices with baudrate and flow-control tuning
//! - [`parallel`]: bit-banged Centronics handshake over `ppdev`
//! - [`usb`]: USB-attached printers presenting a CDC-ACM serial node
//!
//! ## Lifecycle
//!
//! ```text
//! from_uri / serial / parallel / usb      (validates, never touches hardware)
//!        │
//!        ▼
//!      open      (acquires the device node exclusively, applies settings)
//!        │
//!        ▼
//!  write / read / sync / flush / write_rt
//!        │
//!        ▼
//!      close     (releases the device node; drop closes as a fallback)
//! ```
//!
//! Construction failures are recorded on the port rather than raised, so a
//! port built from an untrusted URI can be inspected with
//! [`Port::last_error`] before use, the pattern a spooler backend follows.
//! Every dispatched operation updates `last_error`, so a batch of writes
//! can defer checking to the end.
//!
//! ## Example
//!
//! ```no_run
//! use martel::port::Port;
//! use std::time::Duration;
//!
//! let mut port = Port::from_uri("martel:/dev/ttyS0?type=serial+baudrate=115200");
//! if let Some(err) = port.last_error() {
//!     Err(err)?;
//! }
//!
//! port.open()?;
//! port.set_write_timeout(Duration::from_secs(5));
//! port.write(b"\x1b@Hello\n")?;
//! port.sync()?;
//! port.close()?;
//! # Ok::<(), martel::MartelError>(())
//! ```

pub mod parallel;
pub mod serial;
pub mod usb;

pub(crate) mod fd;
pub(crate) mod timeout;

use std::time::Duration;

use crate::error::{MartelError, Result};
use crate::uri::DeviceUri;

use parallel::{ParallelMode, ParallelSettings};
use serial::{Baudrate, Handshake, SerialSettings};
use usb::UsbSettings;

/// Maximum device path length in bytes.
pub const DEVICE_MAX: usize = 255;

/// The transport kind a port is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Serial,
    Parallel,
    Usb,
}

/// Kind-specific settings, one variant per backend.
#[derive(Debug)]
enum PortSettings {
    Serial(SerialSettings),
    Parallel(ParallelSettings),
    Usb(UsbSettings),
}

/// # Printer Port
///
/// A handle to one printer connection, bound to exactly one transport
/// kind. See the [module documentation](self) for the lifecycle.
#[derive(Debug)]
pub struct Port {
    settings: PortSettings,
    open: bool,
    last_error: Option<MartelError>,
    write_timeout: Duration,
    read_timeout: Duration,
}

impl Port {
    fn with_settings(settings: PortSettings) -> Self {
        Self {
            settings,
            open: false,
            last_error: None,
            // Zero = block indefinitely, the printer power-on default.
            write_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
        }
    }

    fn failed(settings: PortSettings, err: MartelError) -> Self {
        let mut port = Self::with_settings(settings);
        port.last_error = Some(err);
        port
    }

    /// # Build a Port from a Device URI
    ///
    /// The `type` option selects the backend; the remaining options are
    /// interpreted by it (`baudrate`/`handshake` for serial, `mode` for
    /// parallel). Unknown options are ignored.
    ///
    /// A malformed URI or option does not fail the call: the error is
    /// stored and visible through [`last_error`](Self::last_error), and
    /// any later `open` on such a port fails. This mirrors the
    /// create-then-inspect flow of spooler backends.
    pub fn from_uri(uri: &str) -> Self {
        match Self::build_from_uri(uri) {
            Ok(port) => port,
            Err(err) => Self::failed(PortSettings::Serial(SerialSettings::empty()), err),
        }
    }

    fn build_from_uri(uri: &str) -> Result<Self> {
        let parsed = DeviceUri::parse(uri)?;
        let kind = parsed.get("type").ok_or(MartelError::InvalidUri)?;

        let settings = match kind {
            "serial" => PortSettings::Serial(SerialSettings::from_uri(&parsed)?),
            "parallel" => PortSettings::Parallel(ParallelSettings::from_uri(&parsed)?),
            "usb" => PortSettings::Usb(UsbSettings::from_uri(&parsed)?),
            _ => return Err(MartelError::InvalidPortType),
        };

        Ok(Self::with_settings(settings))
    }

    /// A serial port for a device path, with factory defaults
    /// (9600 baud, RTS/CTS). Construction errors are stored.
    pub fn serial(device: &str) -> Self {
        match SerialSettings::new(device) {
            Ok(settings) => Self::with_settings(PortSettings::Serial(settings)),
            Err(err) => Self::failed(PortSettings::Serial(SerialSettings::empty()), err),
        }
    }

    /// A parallel port for a device path, defaulting to poll mode.
    pub fn parallel(device: &str) -> Self {
        match ParallelSettings::new(device) {
            Ok(settings) => Self::with_settings(PortSettings::Parallel(settings)),
            Err(err) => Self::failed(PortSettings::Parallel(ParallelSettings::empty()), err),
        }
    }

    /// A USB port for a device path.
    pub fn usb(device: &str) -> Self {
        match UsbSettings::new(device) {
            Ok(settings) => Self::with_settings(PortSettings::Usb(settings)),
            Err(err) => Self::failed(PortSettings::Usb(UsbSettings::empty()), err),
        }
    }

    /// The transport kind this port is bound to.
    pub fn kind(&self) -> PortKind {
        match self.settings {
            PortSettings::Serial(_) => PortKind::Serial,
            PortSettings::Parallel(_) => PortKind::Parallel,
            PortSettings::Usb(_) => PortKind::Usb,
        }
    }

    /// The configured device path.
    pub fn device(&self) -> &str {
        match &self.settings {
            PortSettings::Serial(s) => s.device(),
            PortSettings::Parallel(p) => p.device(),
            PortSettings::Usb(u) => u.device(),
        }
    }

    /// Whether the OS resource is currently held.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The outcome of the most recent operation: `None` for success, the
    /// failure kind otherwise. Construction errors land here too.
    pub fn last_error(&self) -> Option<MartelError> {
        self.last_error
    }

    /// Serialize the port's configuration back into a device URI.
    pub fn to_uri(&self) -> Result<String> {
        match &self.settings {
            PortSettings::Serial(s) => s.to_uri(),
            PortSettings::Parallel(p) => p.to_uri(),
            PortSettings::Usb(u) => u.to_uri(),
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        self.last_error = result.as_ref().err().copied();
        result
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Acquire and configure the OS resource.
    ///
    /// Fails with [`MartelError::PortAlreadyOpen`] when already open. The
    /// device is opened exclusively: a second process (or port) opening
    /// the same node fails at the OS level.
    pub fn open(&mut self) -> Result<()> {
        let result = self.do_open();
        self.record(result)
    }

    fn do_open(&mut self) -> Result<()> {
        if self.open {
            return Err(MartelError::PortAlreadyOpen);
        }

        match &mut self.settings {
            PortSettings::Serial(s) => s.open(),
            PortSettings::Parallel(p) => p.open(),
            PortSettings::Usb(u) => u.open(),
        }?;

        self.open = true;
        Ok(())
    }

    /// Release the OS resource.
    ///
    /// The port is marked closed even when the backend reports a failure
    /// while releasing: the release is best-effort and the handle is gone
    /// either way.
    pub fn close(&mut self) -> Result<()> {
        let result = self.do_close();
        self.record(result)
    }

    fn do_close(&mut self) -> Result<()> {
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }

        self.open = false;

        match &mut self.settings {
            PortSettings::Serial(s) => s.close(),
            PortSettings::Parallel(p) => p.close(),
            PortSettings::Usb(u) => u.close(),
        }
    }

    // ------------------------------------------------------------------
    // Timeouts
    // ------------------------------------------------------------------

    /// Bound for blocking writes and for `sync`. Zero blocks
    /// indefinitely. May be set while closed; applies to the next
    /// operation.
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.write_timeout = timeout;
    }

    /// Bound for blocking reads. Zero blocks indefinitely.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    /// Write the whole buffer to the printer.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let result = self.do_write(buf);
        self.record(result)
    }

    fn do_write(&mut self, buf: &[u8]) -> Result<()> {
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        let timeout = self.write_timeout;
        match &mut self.settings {
            PortSettings::Serial(s) => s.write(buf, timeout),
            PortSettings::Parallel(p) => p.write(buf, timeout),
            PortSettings::Usb(u) => u.write(buf, timeout),
        }
    }

    /// Write in real time, bypassing the negotiated flow control so
    /// transmission starts immediately.
    ///
    /// Not implemented for parallel ports: there is no handshake-bypass
    /// analog for a bit-banged transfer.
    pub fn write_rt(&mut self, buf: &[u8]) -> Result<()> {
        let result = self.do_write_rt(buf);
        self.record(result)
    }

    fn do_write_rt(&mut self, buf: &[u8]) -> Result<()> {
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        let timeout = self.write_timeout;
        match &mut self.settings {
            PortSettings::Serial(s) => s.write_rt(buf, timeout),
            PortSettings::Parallel(_) => Err(MartelError::NotImplemented),
            PortSettings::Usb(u) => u.write_rt(buf, timeout),
        }
    }

    /// Fill the whole buffer from the printer.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.do_read(buf);
        self.record(result)
    }

    fn do_read(&mut self, buf: &mut [u8]) -> Result<()> {
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        let write_timeout = self.write_timeout;
        let read_timeout = self.read_timeout;
        match &mut self.settings {
            PortSettings::Serial(s) => s.read(buf, read_timeout),
            PortSettings::Parallel(p) => p.read(buf, write_timeout, read_timeout),
            PortSettings::Usb(u) => u.read(buf, read_timeout),
        }
    }

    /// Read a NUL-terminated string, up to `max` bytes including the
    /// terminator. Used for printer identity and status replies.
    pub fn read_string(&mut self, max: usize) -> Result<String> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];

        while bytes.len() + 1 < max {
            self.read(&mut byte)?;
            if byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Block until all queued output has left the local buffer, bounded
    /// by the write timeout when nonzero.
    pub fn sync(&mut self) -> Result<()> {
        let result = self.do_sync();
        self.record(result)
    }

    fn do_sync(&mut self) -> Result<()> {
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        let timeout = self.write_timeout;
        match &mut self.settings {
            PortSettings::Serial(s) => s.sync(timeout),
            PortSettings::Parallel(p) => p.sync(timeout),
            PortSettings::Usb(u) => u.sync(timeout),
        }
    }

    /// Discard buffered but untransmitted/unread data. For a parallel
    /// port in irq mode this also resets the pending-interrupt counter.
    pub fn flush(&mut self) -> Result<()> {
        let result = self.do_flush();
        self.record(result)
    }

    fn do_flush(&mut self) -> Result<()> {
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        let timeout = self.write_timeout;
        match &mut self.settings {
            PortSettings::Serial(s) => s.flush(),
            PortSettings::Parallel(p) => p.flush(timeout),
            PortSettings::Usb(u) => u.flush(),
        }
    }

    // ------------------------------------------------------------------
    // Serial-only settings
    // ------------------------------------------------------------------

    /// The configured baudrate. Serial ports only; the type guard applies
    /// whether or not the port is open.
    pub fn baudrate(&self) -> Result<Baudrate> {
        match &self.settings {
            PortSettings::Serial(s) => Ok(s.baudrate()),
            _ => Err(MartelError::InvalidPortType),
        }
    }

    /// Reconfigure the live line speed. Serial ports only; requires the
    /// port to be open.
    pub fn set_baudrate(&mut self, baudrate: Baudrate) -> Result<()> {
        let result = self.do_set_baudrate(baudrate);
        self.record(result)
    }

    fn do_set_baudrate(&mut self, baudrate: Baudrate) -> Result<()> {
        let PortSettings::Serial(s) = &mut self.settings else {
            return Err(MartelError::InvalidPortType);
        };
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        s.set_baudrate(baudrate)
    }

    /// The configured handshake. Serial ports only.
    pub fn handshake(&self) -> Result<Handshake> {
        match &self.settings {
            PortSettings::Serial(s) => Ok(s.handshake()),
            _ => Err(MartelError::InvalidPortType),
        }
    }

    /// Reconfigure live flow control. Serial ports only; requires the
    /// port to be open.
    pub fn set_handshake(&mut self, handshake: Handshake) -> Result<()> {
        let result = self.do_set_handshake(handshake);
        self.record(result)
    }

    fn do_set_handshake(&mut self, handshake: Handshake) -> Result<()> {
        let PortSettings::Serial(s) = &mut self.settings else {
            return Err(MartelError::InvalidPortType);
        };
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        s.set_handshake(handshake)
    }

    // ------------------------------------------------------------------
    // Parallel-only settings
    // ------------------------------------------------------------------

    /// The configured pacing mode. Parallel ports only.
    pub fn parallel_mode(&self) -> Result<ParallelMode> {
        match &self.settings {
            PortSettings::Parallel(p) => Ok(p.mode()),
            _ => Err(MartelError::InvalidPortType),
        }
    }

    /// Select the pacing mode for subsequent writes. Parallel ports only;
    /// a stored-setting change, allowed while closed.
    pub fn set_parallel_mode(&mut self, mode: ParallelMode) -> Result<()> {
        let result = match &mut self.settings {
            PortSettings::Parallel(p) => {
                p.set_mode(mode);
                Ok(())
            }
            _ => Err(MartelError::InvalidPortType),
        };
        self.record(result)
    }

    /// Hardware-reset the printer with a pulse on the INIT line.
    /// Parallel ports only; requires the port to be open.
    pub fn parallel_reset(&mut self) -> Result<()> {
        let result = self.do_parallel_reset();
        self.record(result)
    }

    fn do_parallel_reset(&mut self) -> Result<()> {
        let PortSettings::Parallel(p) = &mut self.settings else {
            return Err(MartelError::InvalidPortType);
        };
        if !self.open {
            return Err(MartelError::PortNotOpen);
        }
        p.reset()
    }
}

// ============================================================================
// TESTS
// ============================================================================
