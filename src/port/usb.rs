//! # USB-Serial Backend
//!
//! Communication with USB-attached printers that present a CDC-ACM serial
//! device node (`/dev/ttyACM*`). The framing is fixed by the USB transport,
//! so unlike the true serial backend there is no baudrate or handshake to
//! negotiate: the line is simply put into raw 8-bit mode and bytes move
//! with the same select-bounded transfer loops.
//!
//! A USB port rejects baudrate and handshake accessors with
//! [`MartelError::InvalidPortType`].

use std::time::Duration;

use crate::error::{MartelError, Result};
use crate::port::fd::{self, DeviceFd};
use crate::port::serial::configure_raw;
use crate::port::DEVICE_MAX;
use crate::uri::DeviceUri;

/// Settings and state of one USB-serial port.
#[derive(Debug)]
pub(crate) struct UsbSettings {
    device: String,
    io: Option<DeviceFd>,
}

impl UsbSettings {
    pub fn new(device: &str) -> Result<Self> {
        if device.len() > DEVICE_MAX {
            return Err(MartelError::NameTooLong);
        }
        Ok(Self {
            device: device.to_string(),
            io: None,
        })
    }

    pub fn from_uri(uri: &DeviceUri) -> Result<Self> {
        Self::new(uri.device())
    }

    /// A placeholder for a port whose construction failed.
    pub fn empty() -> Self {
        Self {
            device: String::new(),
            io: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn fd(&self) -> Result<std::os::unix::io::RawFd> {
        self.io
            .as_ref()
            .map(DeviceFd::raw)
            .ok_or(MartelError::PortNotOpen)
    }

    /// Acquire the device node exclusively and put it into raw mode.
    ///
    /// A missing node means the printer is not attached
    /// ([`MartelError::UsbDeviceNotFound`]); a node held by another driver
    /// or process reports [`MartelError::UsbDeviceBusy`].
    pub fn open(&mut self) -> Result<()> {
        let flags = libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_EXCL;
        let io = DeviceFd::open(&self.device, flags).map_err(|err| {
            match err.raw_os_error() {
                Some(libc::ENOENT) => MartelError::UsbDeviceNotFound,
                Some(libc::EBUSY) => MartelError::UsbDeviceBusy,
                _ => MartelError::OpenFailed,
            }
        })?;

        configure_raw(io.raw())?;

        self.io = Some(io);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        match self.io.take() {
            Some(mut io) => io.close().map_err(|_| MartelError::CloseFailed),
            None => Ok(()),
        }
    }

    pub fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        fd::write_all(self.fd()?, buf, timeout)
    }

    pub fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        fd::read_all(self.fd()?, buf, timeout)
    }

    pub fn sync(&mut self, timeout: Duration) -> Result<()> {
        fd::drain_output(self.fd()?, timeout)
    }

    pub fn flush(&mut self) -> Result<()> {
        fd::discard_queues(self.fd()?)
    }

    /// Real-time write. There is no handshake to bypass on this transport,
    /// so this is flush, write, drain.
    pub fn write_rt(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        let fd = self.fd()?;

        fd::discard_queues(fd)?;
        fd::write_all(fd, buf, timeout)?;
        fd::drain_output(fd, timeout)?;

        Ok(())
    }

    pub fn to_uri(&self) -> Result<String> {
        DeviceUri::new(&self.device)?
            .with_option("type", "usb")?
            .to_uri()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_uri_takes_device_only() {
        let uri = DeviceUri::parse("martel:/dev/ttyACM0?type=usb+ignored=1").unwrap();
        let settings = UsbSettings::from_uri(&uri).unwrap();
        assert_eq!(settings.device(), "/dev/ttyACM0");
    }

    #[test]
    fn test_to_uri() {
        let settings = UsbSettings::new("/dev/ttyACM0").unwrap();
        assert_eq!(settings.to_uri().unwrap(), "martel:/dev/ttyACM0?type=usb");
    }

    #[test]
    fn test_open_missing_node_reports_not_found() {
        let mut settings =
            UsbSettings::new("/nonexistent/martel-usb-test-node").unwrap();
        assert_eq!(
            settings.open().unwrap_err(),
            MartelError::UsbDeviceNotFound
        );
    }

    #[test]
    fn test_device_name_length_limit() {
        let long = "y".repeat(DEVICE_MAX + 1);
        assert_eq!(UsbSettings::new(&long).unwrap_err(), MartelError::NameTooLong);
    }
}
