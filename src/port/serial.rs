//! # Serial Backend
//!
//! RS-232 communication with the printer through a tty device node.
//!
//! ## Line Discipline
//!
//! The line is put into raw mode on open so binary command and raster data
//! pass through unmodified:
//!
//! - **8-bit characters**: CS8, no parity, one stop bit
//! - **No input/output processing**: `cfmakeraw` clears ICRNL, OPOST, etc.
//! - **Receiver enabled, modem lines ignored**: CREAD | CLOCAL
//!
//! Flow control is applied separately and can be retuned on the live line:
//! hardware (RTS/CTS), software (XON/XOFF) or none. XON/XOFF matters for
//! raster data because 0x11/0x13 occur freely in encoded rows, so the
//! printer-facing default is hardware flow control.
//!
//! ## Blocking Model
//!
//! Reads and writes wait for readiness with `select(2)` bounded by the
//! port's configured timeout, then transfer as many bytes as the kernel
//! accepts, repeating until done. `sync` drains the kernel output queue
//! against the write timeout.

use std::fmt;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MartelError, Result};
use crate::port::fd::{self, DeviceFd};
use crate::port::DEVICE_MAX;
use crate::uri::DeviceUri;

/// Serial line speed. Exactly eight rates are supported by the printer
/// family; anything else is [`MartelError::InvalidBaudrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baudrate {
    B1200,
    B2400,
    B4800,
    /// Printer factory default.
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl Baudrate {
    /// The rate in bits per second.
    pub fn bits_per_second(self) -> u32 {
        match self {
            Self::B1200 => 1200,
            Self::B2400 => 2400,
            Self::B4800 => 4800,
            Self::B9600 => 9600,
            Self::B19200 => 19200,
            Self::B38400 => 38400,
            Self::B57600 => 57600,
            Self::B115200 => 115200,
        }
    }

    /// The termios speed constant.
    fn speed(self) -> libc::speed_t {
        match self {
            Self::B1200 => libc::B1200,
            Self::B2400 => libc::B2400,
            Self::B4800 => libc::B4800,
            Self::B9600 => libc::B9600,
            Self::B19200 => libc::B19200,
            Self::B38400 => libc::B38400,
            Self::B57600 => libc::B57600,
            Self::B115200 => libc::B115200,
        }
    }

    /// The URI option spelling, e.g. `"9600"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::B1200 => "1200",
            Self::B2400 => "2400",
            Self::B4800 => "4800",
            Self::B9600 => "9600",
            Self::B19200 => "19200",
            Self::B38400 => "38400",
            Self::B57600 => "57600",
            Self::B115200 => "115200",
        }
    }
}

impl fmt::Display for Baudrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Baudrate {
    type Err = MartelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1200" => Ok(Self::B1200),
            "2400" => Ok(Self::B2400),
            "4800" => Ok(Self::B4800),
            "9600" => Ok(Self::B9600),
            "19200" => Ok(Self::B19200),
            "38400" => Ok(Self::B38400),
            "57600" => Ok(Self::B57600),
            "115200" => Ok(Self::B115200),
            _ => Err(MartelError::InvalidBaudrate),
        }
    }
}

/// Flow-control discipline governing transmission pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Handshake {
    /// No flow control.
    None,
    /// Software flow control (XON/XOFF).
    XonXoff,
    /// Hardware flow control (RTS/CTS). Printer factory default.
    #[default]
    RtsCts,
}

impl Handshake {
    /// The URI option spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::XonXoff => "xonxoff",
            Self::RtsCts => "rtscts",
        }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Handshake {
    type Err = MartelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "xonxoff" => Ok(Self::XonXoff),
            "rtscts" => Ok(Self::RtsCts),
            _ => Err(MartelError::InvalidHandshake),
        }
    }
}

/// Settings and state of one serial port.
#[derive(Debug)]
pub(crate) struct SerialSettings {
    device: String,
    baudrate: Baudrate,
    handshake: Handshake,
    io: Option<DeviceFd>,
}

impl SerialSettings {
    /// Settings for a device path with factory defaults (9600, RTS/CTS).
    pub fn new(device: &str) -> Result<Self> {
        if device.len() > DEVICE_MAX {
            return Err(MartelError::NameTooLong);
        }
        Ok(Self {
            device: device.to_string(),
            baudrate: Baudrate::default(),
            handshake: Handshake::default(),
            io: None,
        })
    }

    /// Settings from a parsed URI; `baudrate` and `handshake` options
    /// override the defaults when present.
    pub fn from_uri(uri: &DeviceUri) -> Result<Self> {
        let mut settings = Self::new(uri.device())?;
        if let Some(value) = uri.get("baudrate") {
            settings.baudrate = value.parse()?;
        }
        if let Some(value) = uri.get("handshake") {
            settings.handshake = value.parse()?;
        }
        Ok(settings)
    }

    /// A placeholder for a port whose construction failed.
    pub fn empty() -> Self {
        Self {
            device: String::new(),
            baudrate: Baudrate::default(),
            handshake: Handshake::default(),
            io: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn baudrate(&self) -> Baudrate {
        self.baudrate
    }

    pub fn handshake(&self) -> Handshake {
        self.handshake
    }

    fn fd(&self) -> Result<RawFd> {
        self.io
            .as_ref()
            .map(DeviceFd::raw)
            .ok_or(MartelError::PortNotOpen)
    }

    /// Acquire the device exclusively and apply the stored line settings.
    pub fn open(&mut self) -> Result<()> {
        // O_NOCTTY: never become the controlling terminal.
        // O_NONBLOCK: open without waiting for carrier; transfers pace
        // themselves with select().
        // O_EXCL: exclusive access.
        let flags = libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_EXCL;
        let io = DeviceFd::open(&self.device, flags).map_err(|_| MartelError::OpenFailed)?;

        configure_raw(io.raw())?;
        apply_baudrate(io.raw(), self.baudrate)?;
        apply_handshake(io.raw(), self.handshake)?;

        self.io = Some(io);
        Ok(())
    }

    /// Release the device node.
    pub fn close(&mut self) -> Result<()> {
        match self.io.take() {
            Some(mut io) => io.close().map_err(|_| MartelError::CloseFailed),
            None => Ok(()),
        }
    }

    /// Reconfigure the live line speed, then remember it.
    pub fn set_baudrate(&mut self, baudrate: Baudrate) -> Result<()> {
        apply_baudrate(self.fd()?, baudrate)?;
        self.baudrate = baudrate;
        Ok(())
    }

    /// Reconfigure live flow control, then remember it.
    pub fn set_handshake(&mut self, handshake: Handshake) -> Result<()> {
        apply_handshake(self.fd()?, handshake)?;
        self.handshake = handshake;
        Ok(())
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

    /// Real-time write: start transmitting immediately, ignoring the
    /// negotiated flow control.
    ///
    /// Pending queues are flushed so transmission starts at once, the
    /// handshake is lowered to none for the duration of the transfer, and
    /// the stored handshake is restored after the line has drained.
    pub fn write_rt(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        let fd = self.fd()?;

        fd::discard_queues(fd)?;
        apply_handshake(fd, Handshake::None)?;
        fd::write_all(fd, buf, timeout)?;
        fd::drain_output(fd, timeout)?;
        apply_handshake(fd, self.handshake)?;

        Ok(())
    }

    pub fn to_uri(&self) -> Result<String> {
        DeviceUri::new(&self.device)?
            .with_option("type", "serial")?
            .with_option("baudrate", self.baudrate.as_str())?
            .with_option("handshake", self.handshake.as_str())?
            .to_uri()
    }
}

// ============================================================================
// TERMIOS GLUE
// ============================================================================

fn line_attrs(fd: RawFd) -> Result<libc::termios> {
    let mut attrs = MaybeUninit::<libc::termios>::uninit();
    if unsafe { libc::tcgetattr(fd, attrs.as_mut_ptr()) } < 0 {
        return Err(MartelError::Io);
    }
    Ok(unsafe { attrs.assume_init() })
}

fn set_line_attrs(fd: RawFd, attrs: &libc::termios) -> Result<()> {
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, attrs) } < 0 {
        return Err(MartelError::Io);
    }
    Ok(())
}

/// Put the line into raw binary mode: 8 data bits, no parity, one stop
/// bit, receiver enabled, modem control lines ignored.
pub(crate) fn configure_raw(fd: RawFd) -> Result<()> {
    let mut attrs = line_attrs(fd)?;

    unsafe { libc::cfmakeraw(&mut attrs) };

    attrs.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
    attrs.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;

    set_line_attrs(fd, &attrs)
}

/// Apply a speed to the live line without closing it.
fn apply_baudrate(fd: RawFd, baudrate: Baudrate) -> Result<()> {
    let mut attrs = line_attrs(fd)?;

    let speed = baudrate.speed();
    if unsafe { libc::cfsetispeed(&mut attrs, speed) } < 0 {
        return Err(MartelError::Io);
    }
    if unsafe { libc::cfsetospeed(&mut attrs, speed) } < 0 {
        return Err(MartelError::Io);
    }

    set_line_attrs(fd, &attrs)
}

/// Apply a flow-control discipline to the live line.
///
/// The two mechanisms are mutually exclusive: enabling one always disables
/// the other.
fn apply_handshake(fd: RawFd, handshake: Handshake) -> Result<()> {
    let mut attrs = line_attrs(fd)?;

    match handshake {
        Handshake::None => {
            attrs.c_cflag &= !libc::CRTSCTS;
            attrs.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        }
        Handshake::XonXoff => {
            attrs.c_cflag &= !libc::CRTSCTS;
            attrs.c_iflag |= libc::IXON | libc::IXOFF | libc::IXANY;
        }
        Handshake::RtsCts => {
            attrs.c_cflag |= libc::CRTSCTS;
            attrs.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        }
    }

    set_line_attrs(fd, &attrs)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_baudrate_parse_round_trip() {
        for text in ["1200", "2400", "4800", "9600", "19200", "38400", "57600", "115200"] {
            let baudrate: Baudrate = text.parse().unwrap();
            assert_eq!(baudrate.as_str(), text);
        }
    }

    #[test]
    fn test_baudrate_rejects_unknown_rates() {
        assert_eq!("300".parse::<Baudrate>(), Err(MartelError::InvalidBaudrate));
        assert_eq!("9601".parse::<Baudrate>(), Err(MartelError::InvalidBaudrate));
        assert_eq!("".parse::<Baudrate>(), Err(MartelError::InvalidBaudrate));
    }

    #[test]
    fn test_handshake_parse() {
        assert_eq!("none".parse::<Handshake>().unwrap(), Handshake::None);
        assert_eq!("xonxoff".parse::<Handshake>().unwrap(), Handshake::XonXoff);
        assert_eq!("rtscts".parse::<Handshake>().unwrap(), Handshake::RtsCts);
        assert_eq!(
            "RTSCTS".parse::<Handshake>(),
            Err(MartelError::InvalidHandshake)
        );
    }

    #[test]
    fn test_defaults_match_printer_factory_settings() {
        let settings = SerialSettings::new("/dev/ttyS0").unwrap();
        assert_eq!(settings.baudrate(), Baudrate::B9600);
        assert_eq!(settings.handshake(), Handshake::RtsCts);
    }

    #[test]
    fn test_from_uri_overrides() {
        let uri = DeviceUri::parse(
            "martel:/dev/ttyS1?type=serial+baudrate=57600+handshake=xonxoff",
        )
        .unwrap();
        let settings = SerialSettings::from_uri(&uri).unwrap();
        assert_eq!(settings.device(), "/dev/ttyS1");
        assert_eq!(settings.baudrate(), Baudrate::B57600);
        assert_eq!(settings.handshake(), Handshake::XonXoff);
    }

    #[test]
    fn test_from_uri_rejects_bad_values() {
        let uri =
            DeviceUri::parse("martel:/dev/ttyS1?type=serial+baudrate=123").unwrap();
        assert_eq!(
            SerialSettings::from_uri(&uri).unwrap_err(),
            MartelError::InvalidBaudrate
        );

        let uri =
            DeviceUri::parse("martel:/dev/ttyS1?type=serial+handshake=dtr").unwrap();
        assert_eq!(
            SerialSettings::from_uri(&uri).unwrap_err(),
            MartelError::InvalidHandshake
        );
    }

    #[test]
    fn test_device_name_length_limit() {
        let long = "x".repeat(DEVICE_MAX + 1);
        assert_eq!(
            SerialSettings::new(&long).unwrap_err(),
            MartelError::NameTooLong
        );
    }

    #[test]
    fn test_to_uri_serializes_settings() {
        let uri = DeviceUri::parse(
            "martel:/dev/ttyS0?type=serial+baudrate=19200+handshake=none",
        )
        .unwrap();
        let settings = SerialSettings::from_uri(&uri).unwrap();
        assert_eq!(
            settings.to_uri().unwrap(),
            "martel:/dev/ttyS0?type=serial+baudrate=19200+handshake=none"
        );
    }

    #[test]
    fn test_closed_port_has_no_descriptor() {
        let settings = SerialSettings::new("/dev/ttyS0").unwrap();
        assert_eq!(settings.fd().unwrap_err(), MartelError::PortNotOpen);
    }
}
