//! # Parallel Backend
//!
//! Centronics-style communication with the printer through a `ppdev`
//! device node (`/dev/parport*`), transferring one byte at a time with an
//! explicit STROBE/BUSY/ACK handshake.
//!
//! ## Signal Sense
//!
//! The wire levels and the logical handshake disagree on polarity, so the
//! protocol code never looks at raw bits:
//!
//! | Signal | Register bit | Asserted when |
//! |--------|--------------|---------------|
//! | STROBE | control 0x01 | bit set |
//! | AUTOFD | control 0x02 | bit set |
//! | INIT   | control 0x04 | bit **clear** |
//! | ACK    | status 0x40  | bit **clear** |
//! | BUSY   | status 0x80  | bit **clear** |
//!
//! [`Status`] exposes `*_asserted()` helpers carrying the inversion in one
//! place.
//!
//! ## Operating Modes
//!
//! - **Poll** (default): every byte is walked through the handshake by
//!   busy-polling the status register. The kernel queue is never used, so
//!   `sync` has nothing to wait for.
//! - **Irq**: bytes are submitted to the kernel queue and a counter tracks
//!   how many are still in flight; interrupt-count notifications from the
//!   port retire them. `sync` waits for the counter to reach zero.
//!
//! ## Timeouts
//!
//! Each operation builds one [`Deadline`] from the configured timeout and
//! every wait state checks it after polling, so expiry surfaces as
//! [`MartelError::WriteTimeout`] / [`MartelError::ReadTimeout`] from
//! whichever wait the transfer was in.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use bitflags::bitflags;

use crate::error::{MartelError, Result};
use crate::port::fd::{self, DeviceFd, Readiness};
use crate::port::timeout::Deadline;
use crate::port::DEVICE_MAX;
use crate::uri::DeviceUri;

/// Width of the reset pulse and the settle delay that follows it.
const RESET_SETTLE: Duration = Duration::from_millis(100);

bitflags! {
    /// Control register lines (`PARPORT_CONTROL_*`).
    pub struct Control: u8 {
        const STROBE = 0x01;
        const AUTOFD = 0x02;
        const INIT   = 0x04;
        const SELECT = 0x08;
    }
}

bitflags! {
    /// Status register lines (`PARPORT_STATUS_*`).
    pub struct Status: u8 {
        const ERROR    = 0x08;
        const SELECT   = 0x10;
        const PAPEROUT = 0x20;
        const ACK      = 0x40;
        const BUSY     = 0x80;
    }
}

impl Status {
    /// BUSY is active low: the printer holds the line down while it
    /// cannot accept data.
    pub fn busy_asserted(self) -> bool {
        !self.contains(Status::BUSY)
    }

    pub fn busy_deasserted(self) -> bool {
        self.contains(Status::BUSY)
    }

    /// ACK is active low.
    pub fn ack_asserted(self) -> bool {
        !self.contains(Status::ACK)
    }

    pub fn ack_deasserted(self) -> bool {
        self.contains(Status::ACK)
    }
}

/// Pacing strategy for parallel writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelMode {
    /// Busy-wait the status lines for every byte.
    #[default]
    Poll,
    /// Queue bytes in the kernel and count retirement interrupts.
    Irq,
}

impl ParallelMode {
    /// The URI option spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Irq => "irq",
        }
    }
}

impl fmt::Display for ParallelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParallelMode {
    type Err = MartelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "poll" => Ok(Self::Poll),
            "irq" => Ok(Self::Irq),
            _ => Err(MartelError::InvalidParallelMode),
        }
    }
}

// ============================================================================
// LINE-LEVEL INTERFACE
// ============================================================================

/// The line-level operations the handshake engine runs against.
///
/// Production code drives a `ppdev` node through [`PpdevIo`]; the unit
/// tests substitute a scripted simulator so the byte protocol can be
/// verified without hardware.
pub(crate) trait ParallelIo {
    /// Read the status register.
    fn status(&mut self) -> Result<Status>;

    /// Present a byte on the data lines (drivers must be set as output).
    fn write_data(&mut self, byte: u8) -> Result<()>;

    /// Capture the data lines (drivers must be set as input).
    fn read_data(&mut self) -> Result<u8>;

    /// Set the masked control lines to `value` (frob: read-modify-write).
    fn frob_control(&mut self, mask: Control, value: Control) -> Result<()>;

    /// Switch the data line drivers between output (false) and input.
    fn set_direction(&mut self, input: bool) -> Result<()>;

    /// Queue bytes through the kernel (irq mode). Returns how many were
    /// accepted.
    fn submit(&mut self, buf: &[u8]) -> Result<usize>;

    /// Wait until the port raises at least one retirement interrupt, then
    /// return the number of interrupts counted since the last call.
    /// Deadline expiry is [`MartelError::WriteTimeout`].
    fn wait_irq(&mut self, deadline: &Deadline) -> Result<usize>;

    /// Reset the kernel's interrupt counter, returning the discarded count.
    fn clear_irq(&mut self) -> Result<usize>;
}

fn assert_strobe(io: &mut dyn ParallelIo) -> Result<()> {
    io.frob_control(Control::STROBE, Control::STROBE)
}

fn deassert_strobe(io: &mut dyn ParallelIo) -> Result<()> {
    io.frob_control(Control::STROBE, Control::empty())
}

fn assert_autofd(io: &mut dyn ParallelIo) -> Result<()> {
    io.frob_control(Control::AUTOFD, Control::AUTOFD)
}

fn deassert_autofd(io: &mut dyn ParallelIo) -> Result<()> {
    io.frob_control(Control::AUTOFD, Control::empty())
}

/// INIT is active low on the wire: asserting it clears the bit.
fn assert_init(io: &mut dyn ParallelIo) -> Result<()> {
    io.frob_control(Control::INIT, Control::empty())
}

fn deassert_init(io: &mut dyn ParallelIo) -> Result<()> {
    io.frob_control(Control::INIT, Control::INIT)
}

/// Return every control line to its idle (deasserted) level.
fn control_idle(io: &mut dyn ParallelIo) -> Result<()> {
    deassert_init(io)?;
    deassert_strobe(io)?;
    deassert_autofd(io)?;
    Ok(())
}

// ============================================================================
// BYTE HANDSHAKE STATE MACHINES
// ============================================================================

/// States of the poll-mode byte write handshake.
///
/// ```text
/// AwaitReady --BUSY deasserted--> Present --data+STROBE--> AwaitLatch
/// AwaitLatch --BUSY asserted--> Release --STROBE off--> AwaitComplete
/// AwaitComplete --ACK & BUSY deasserted--> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    /// Wait until the printer can accept a byte.
    AwaitReady,
    /// Drive the data lines and assert STROBE.
    Present,
    /// Wait for the printer to latch the byte (BUSY asserts).
    AwaitLatch,
    /// Remove STROBE.
    Release,
    /// Wait for the transfer to finish (ACK and BUSY both deasserted).
    AwaitComplete,
    Done,
}

/// Walk one byte through the write handshake.
///
/// Every wait state re-polls the status register and then checks the
/// deadline, so a hung printer turns into [`MartelError::WriteTimeout`]
/// from whichever wait the transfer was stuck in.
fn write_byte(io: &mut dyn ParallelIo, byte: u8, deadline: &Deadline) -> Result<()> {
    let mut state = WriteState::AwaitReady;

    while state != WriteState::Done {
        state = match state {
            WriteState::AwaitReady => {
                if io.status()?.busy_deasserted() {
                    WriteState::Present
                } else if deadline.expired() {
                    return Err(MartelError::WriteTimeout);
                } else {
                    WriteState::AwaitReady
                }
            }
            WriteState::Present => {
                io.write_data(byte)?;
                assert_strobe(io)?;
                WriteState::AwaitLatch
            }
            WriteState::AwaitLatch => {
                if io.status()?.busy_asserted() {
                    WriteState::Release
                } else if deadline.expired() {
                    return Err(MartelError::WriteTimeout);
                } else {
                    WriteState::AwaitLatch
                }
            }
            WriteState::Release => {
                deassert_strobe(io)?;
                WriteState::AwaitComplete
            }
            WriteState::AwaitComplete => {
                // The falling edge of ACK is easy to miss when the host is
                // slow or preempted; BUSY deasserting also marks the end
                // of the transfer and is level- rather than edge-sensitive.
                let status = io.status()?;
                if status.ack_deasserted() && status.busy_deasserted() {
                    WriteState::Done
                } else if deadline.expired() {
                    return Err(MartelError::WriteTimeout);
                } else {
                    WriteState::AwaitComplete
                }
            }
            WriteState::Done => unreachable!(),
        };
    }

    Ok(())
}

/// States of the byte read handshake. AUTOFD plays the role the data
/// presentation plays on the write side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Wait until the printer is idle.
    AwaitReady,
    /// Assert AUTOFD to request a byte.
    Request,
    /// Wait for the printer to present data (ACK asserts).
    AwaitData,
    /// Capture the byte, drop AUTOFD, acknowledge with STROBE.
    Capture,
    /// Wait for the printer to release (ACK deasserts).
    AwaitRelease,
    /// Remove STROBE.
    Finish,
    Done,
}

/// Walk one byte through the read handshake. The data line drivers must
/// already be switched to input.
fn read_byte(io: &mut dyn ParallelIo, deadline: &Deadline) -> Result<u8> {
    let mut state = ReadState::AwaitReady;
    let mut byte = 0u8;

    while state != ReadState::Done {
        state = match state {
            ReadState::AwaitReady => {
                if io.status()?.busy_deasserted() {
                    ReadState::Request
                } else if deadline.expired() {
                    return Err(MartelError::ReadTimeout);
                } else {
                    ReadState::AwaitReady
                }
            }
            ReadState::Request => {
                assert_autofd(io)?;
                ReadState::AwaitData
            }
            ReadState::AwaitData => {
                if io.status()?.ack_asserted() {
                    ReadState::Capture
                } else if deadline.expired() {
                    return Err(MartelError::ReadTimeout);
                } else {
                    ReadState::AwaitData
                }
            }
            ReadState::Capture => {
                byte = io.read_data()?;
                deassert_autofd(io)?;
                assert_strobe(io)?;
                ReadState::AwaitRelease
            }
            ReadState::AwaitRelease => {
                if io.status()?.ack_deasserted() {
                    ReadState::Finish
                } else if deadline.expired() {
                    return Err(MartelError::ReadTimeout);
                } else {
                    ReadState::AwaitRelease
                }
            }
            ReadState::Finish => {
                deassert_strobe(io)?;
                ReadState::Done
            }
            ReadState::Done => unreachable!(),
        };
    }

    Ok(byte)
}

/// Retire in-flight bytes against the pending counter (irq mode).
///
/// The port occasionally reports more retirement interrupts than bytes are
/// pending; the counter clamps at zero rather than treating this as an
/// error.
fn retire_irqs(
    io: &mut dyn ParallelIo,
    pending: &mut usize,
    deadline: &Deadline,
) -> Result<()> {
    if *pending == 0 {
        return Ok(());
    }

    let retired = io.wait_irq(deadline)?;
    *pending = pending.saturating_sub(retired);

    Ok(())
}

/// Write a buffer byte-by-byte through the poll-mode handshake.
///
/// On any failure the control lines are returned to idle so a later
/// operation starts from a known level.
fn write_polled(io: &mut dyn ParallelIo, buf: &[u8], deadline: &Deadline) -> Result<()> {
    for &byte in buf {
        if let Err(err) = write_byte(io, byte, deadline) {
            let _ = control_idle(io);
            return Err(err);
        }
    }
    Ok(())
}

/// Read a buffer through the byte handshake, with the data line drivers
/// switched to input for the duration of the transfer.
///
/// The drivers are switched back to output afterwards, also on failure,
/// so the port stays ready for subsequent writes. A failed transfer also
/// idles the control lines first.
fn read_switched(
    io: &mut dyn ParallelIo,
    buf: &mut [u8],
    deadline: &Deadline,
) -> Result<()> {
    io.set_direction(true)?;

    let mut result = Ok(());
    for slot in buf.iter_mut() {
        match read_byte(io, deadline) {
            Ok(byte) => *slot = byte,
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }

    if result.is_err() {
        let _ = control_idle(io);
    }

    io.set_direction(false)?;

    result
}

/// Write a buffer through the kernel queue, pacing on retirement
/// interrupts.
fn write_queued(
    io: &mut dyn ParallelIo,
    pending: &mut usize,
    buf: &[u8],
    deadline: &Deadline,
) -> Result<()> {
    let mut buf = buf;

    while !buf.is_empty() {
        // Free space in the kernel buffer before pushing more.
        retire_irqs(io, pending, deadline)?;

        let n = io.submit(buf)?;
        if deadline.expired() {
            return Err(MartelError::WriteTimeout);
        }

        buf = &buf[n..];
        *pending += n;
    }

    Ok(())
}

// ============================================================================
// PPDEV DEVICE
// ============================================================================

// ioctl requests from <linux/ppdev.h>, type 'p'.
const PPSETMODE: libc::c_ulong = 0x4004_7080;
const PPRSTATUS: libc::c_ulong = 0x8001_7081;
const PPRDATA: libc::c_ulong = 0x8001_7085;
const PPWDATA: libc::c_ulong = 0x4001_7086;
const PPCLAIM: libc::c_ulong = 0x0000_708B;
const PPRELEASE: libc::c_ulong = 0x0000_708C;
const PPFCONTROL: libc::c_ulong = 0x4002_708E;
const PPDATADIR: libc::c_ulong = 0x4004_7090;
const PPCLRIRQ: libc::c_ulong = 0x8004_7093;

/// IEEE 1284 compatibility (Centronics) mode, from <linux/parport.h>.
const IEEE1284_MODE_COMPAT: libc::c_int = 0;

#[repr(C)]
struct PpdevFrob {
    mask: u8,
    val: u8,
}

/// A claimed `ppdev` parallel port.
#[derive(Debug)]
pub(crate) struct PpdevIo {
    io: DeviceFd,
    claimed: bool,
}

impl PpdevIo {
    /// Open the device exclusively, claim it and select compatibility
    /// mode.
    pub fn open(device: &str) -> Result<Self> {
        let flags = libc::O_RDWR | libc::O_NONBLOCK | libc::O_EXCL;
        let io = DeviceFd::open(device, flags).map_err(|_| MartelError::OpenFailed)?;

        if unsafe { libc::ioctl(io.raw(), PPCLAIM) } < 0 {
            return Err(MartelError::Io);
        }

        let mut ppdev = Self { io, claimed: true };

        let mode = IEEE1284_MODE_COMPAT;
        if unsafe { libc::ioctl(ppdev.io.raw(), PPSETMODE, &mode) } < 0 {
            return Err(MartelError::Io);
        }

        ppdev.clear_irq()?;

        Ok(ppdev)
    }

    /// Release the claim and close the node.
    pub fn close(&mut self) -> Result<()> {
        if self.claimed {
            self.claimed = false;
            if unsafe { libc::ioctl(self.io.raw(), PPRELEASE) } < 0 {
                return Err(MartelError::Io);
            }
        }
        self.io.close().map_err(|_| MartelError::CloseFailed)
    }
}

impl Drop for PpdevIo {
    fn drop(&mut self) {
        if self.claimed {
            unsafe {
                libc::ioctl(self.io.raw(), PPRELEASE);
            }
        }
    }
}

impl ParallelIo for PpdevIo {
    fn status(&mut self) -> Result<Status> {
        let mut raw: u8 = 0;
        if unsafe { libc::ioctl(self.io.raw(), PPRSTATUS, &mut raw) } < 0 {
            return Err(MartelError::Io);
        }
        Ok(Status::from_bits_truncate(raw))
    }

    fn write_data(&mut self, byte: u8) -> Result<()> {
        if unsafe { libc::ioctl(self.io.raw(), PPWDATA, &byte) } < 0 {
            return Err(MartelError::Io);
        }
        Ok(())
    }

    fn read_data(&mut self) -> Result<u8> {
        let mut byte: u8 = 0;
        if unsafe { libc::ioctl(self.io.raw(), PPRDATA, &mut byte) } < 0 {
            return Err(MartelError::Io);
        }
        Ok(byte)
    }

    fn frob_control(&mut self, mask: Control, value: Control) -> Result<()> {
        let frob = PpdevFrob {
            mask: mask.bits(),
            val: value.bits(),
        };
        if unsafe { libc::ioctl(self.io.raw(), PPFCONTROL, &frob) } < 0 {
            return Err(MartelError::Io);
        }
        Ok(())
    }

    fn set_direction(&mut self, input: bool) -> Result<()> {
        let dir: libc::c_int = if input { 1 } else { 0 };
        if unsafe { libc::ioctl(self.io.raw(), PPDATADIR, &dir) } < 0 {
            return Err(MartelError::Io);
        }
        Ok(())
    }

    fn submit(&mut self, buf: &[u8]) -> Result<usize> {
        let n = unsafe { libc::write(self.io.raw(), buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(MartelError::WriteFailed);
        }
        Ok(n as usize)
    }

    fn wait_irq(&mut self, deadline: &Deadline) -> Result<usize> {
        let timeout = match deadline.remaining() {
            Some(left) if left.is_zero() => return Err(MartelError::WriteTimeout),
            Some(left) => left,
            // wait_ready treats zero as "block forever"
            None => Duration::ZERO,
        };

        match fd::wait_ready(self.io.raw(), Readiness::Readable, timeout) {
            Err(_) => Err(MartelError::Io),
            Ok(false) => Err(MartelError::WriteTimeout),
            Ok(true) => self.clear_irq(),
        }
    }

    fn clear_irq(&mut self) -> Result<usize> {
        let mut count: libc::c_int = 0;
        if unsafe { libc::ioctl(self.io.raw(), PPCLRIRQ, &mut count) } < 0 {
            return Err(MartelError::Io);
        }
        Ok(count.max(0) as usize)
    }
}

// ============================================================================
// PARALLEL PORT SETTINGS
// ============================================================================

/// Settings and state of one parallel port.
#[derive(Debug)]
pub(crate) struct ParallelSettings {
    device: String,
    mode: ParallelMode,
    /// Bytes submitted to the kernel queue but not yet retired by an
    /// interrupt. Only meaningful in irq mode.
    pending: usize,
    io: Option<PpdevIo>,
}

impl ParallelSettings {
    pub fn new(device: &str) -> Result<Self> {
        if device.len() > DEVICE_MAX {
            return Err(MartelError::NameTooLong);
        }
        Ok(Self {
            device: device.to_string(),
            mode: ParallelMode::default(),
            pending: 0,
            io: None,
        })
    }

    pub fn from_uri(uri: &DeviceUri) -> Result<Self> {
        let mut settings = Self::new(uri.device())?;
        if let Some(value) = uri.get("mode") {
            settings.mode = value.parse()?;
        }
        Ok(settings)
    }

    /// A placeholder for a port whose construction failed.
    pub fn empty() -> Self {
        Self {
            device: String::new(),
            mode: ParallelMode::default(),
            pending: 0,
            io: None,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn mode(&self) -> ParallelMode {
        self.mode
    }

    /// Select the pacing mode for subsequent writes. Allowed while closed;
    /// takes effect on the next transfer.
    pub fn set_mode(&mut self, mode: ParallelMode) {
        self.mode = mode;
    }

    fn io(&mut self) -> Result<&mut PpdevIo> {
        self.io.as_mut().ok_or(MartelError::PortNotOpen)
    }

    pub fn open(&mut self) -> Result<()> {
        let io = PpdevIo::open(&self.device)?;
        self.pending = 0;
        self.io = Some(io);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        match self.io.take() {
            Some(mut io) => io.close(),
            None => Ok(()),
        }
    }

    pub fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<()> {
        let deadline = Deadline::after(timeout);
        let Self { pending, mode, io, .. } = self;
        let io = io.as_mut().ok_or(MartelError::PortNotOpen)?;

        match mode {
            ParallelMode::Poll => write_polled(io, buf, &deadline),
            ParallelMode::Irq => write_queued(io, pending, buf, &deadline),
        }
    }

    /// Read bytes from the printer. Outstanding output is synced first,
    /// then the transfer runs with the line drivers switched to input
    /// (see [`read_switched`]).
    pub fn read(
        &mut self,
        buf: &mut [u8],
        write_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<()> {
        self.sync(write_timeout)?;

        let deadline = Deadline::after(read_timeout);
        read_switched(self.io()?, buf, &deadline)
    }

    pub fn sync(&mut self, timeout: Duration) -> Result<()> {
        match self.mode {
            // Every byte was handshaken out before write() returned.
            ParallelMode::Poll => Ok(()),
            ParallelMode::Irq => {
                let deadline = Deadline::after(timeout);
                let Self { pending, io, .. } = self;
                let io = io.as_mut().ok_or(MartelError::PortNotOpen)?;

                while *pending > 0 {
                    retire_irqs(io, pending, &deadline)?;
                }
                Ok(())
            }
        }
    }

    /// Wait out in-flight bytes, then discard the interrupt counter and
    /// the pending count.
    pub fn flush(&mut self, timeout: Duration) -> Result<()> {
        self.sync(timeout)?;
        self.io()?.clear_irq()?;
        self.pending = 0;
        Ok(())
    }

    /// Hardware-reset the printer with a pulse on INIT.
    pub fn reset(&mut self) -> Result<()> {
        let io = self.io()?;

        control_idle(io)?;
        assert_init(io)?;
        thread::sleep(RESET_SETTLE);
        deassert_init(io)?;
        thread::sleep(RESET_SETTLE);

        Ok(())
    }

    pub fn to_uri(&self) -> Result<String> {
        DeviceUri::new(&self.device)?
            .with_option("type", "parallel")?
            .with_option("mode", self.mode.as_str())?
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
    use std::collections::VecDeque;

    /// Everything the handshake engine does to the line, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SimOp {
        Status(Status),
        WriteData(u8),
        ReadData,
        Frob(Control, Control),
        Direction(bool),
        Submit(usize),
        WaitIrq,
        ClearIrq,
    }

    /// A scripted printer: status reads pop from a script (the last entry
    /// repeats once the script runs dry), data reads pop from `data_in`,
    /// and every line-level call is logged.
    struct SimIo {
        statuses: VecDeque<Status>,
        last_status: Status,
        data_in: VecDeque<u8>,
        irq_counts: VecDeque<usize>,
        submit_limit: usize,
        ops: Vec<SimOp>,
    }

    impl SimIo {
        fn new(statuses: &[Status]) -> Self {
            Self {
                statuses: statuses.iter().copied().collect(),
                last_status: Status::ACK | Status::BUSY,
                data_in: VecDeque::new(),
                irq_counts: VecDeque::new(),
                submit_limit: usize::MAX,
                ops: Vec::new(),
            }
        }
    }

    /// Idle line: ACK and BUSY both deasserted (bits high).
    const READY: Status = Status::from_bits_truncate(0xC0);
    /// Printer latched the byte: BUSY asserted (low), ACK not yet.
    const LATCHED: Status = Status::from_bits_truncate(0x40);
    /// Printer busy and acknowledging: both lines low.
    const HELD: Status = Status::from_bits_truncate(0x00);
    /// Printer presenting read data: ACK asserted, BUSY deasserted.
    const PRESENTING: Status = Status::from_bits_truncate(0x80);

    impl ParallelIo for SimIo {
        fn status(&mut self) -> Result<Status> {
            let status = match self.statuses.pop_front() {
                Some(status) => {
                    self.last_status = status;
                    status
                }
                None => self.last_status,
            };
            self.ops.push(SimOp::Status(status));
            Ok(status)
        }

        fn write_data(&mut self, byte: u8) -> Result<()> {
            self.ops.push(SimOp::WriteData(byte));
            Ok(())
        }

        fn read_data(&mut self) -> Result<u8> {
            self.ops.push(SimOp::ReadData);
            Ok(self.data_in.pop_front().unwrap_or(0))
        }

        fn frob_control(&mut self, mask: Control, value: Control) -> Result<()> {
            self.ops.push(SimOp::Frob(mask, value));
            Ok(())
        }

        fn set_direction(&mut self, input: bool) -> Result<()> {
            self.ops.push(SimOp::Direction(input));
            Ok(())
        }

        fn submit(&mut self, buf: &[u8]) -> Result<usize> {
            let n = buf.len().min(self.submit_limit);
            self.ops.push(SimOp::Submit(n));
            Ok(n)
        }

        fn wait_irq(&mut self, _deadline: &Deadline) -> Result<usize> {
            self.ops.push(SimOp::WaitIrq);
            self.irq_counts
                .pop_front()
                .ok_or(MartelError::WriteTimeout)
        }

        fn clear_irq(&mut self) -> Result<usize> {
            self.ops.push(SimOp::ClearIrq);
            Ok(0)
        }
    }

    #[test]
    fn test_write_byte_handshake_order() {
        // Busy at first, then ready; latches after STROBE; then releases.
        let mut sim = SimIo::new(&[HELD, READY, LATCHED, READY]);
        let deadline = Deadline::after(Duration::ZERO);

        write_byte(&mut sim, 0xA5, &deadline).unwrap();

        assert_eq!(
            sim.ops,
            vec![
                SimOp::Status(HELD),
                SimOp::Status(READY),
                SimOp::WriteData(0xA5),
                SimOp::Frob(Control::STROBE, Control::STROBE),
                SimOp::Status(LATCHED),
                SimOp::Frob(Control::STROBE, Control::empty()),
                SimOp::Status(READY),
            ]
        );
    }

    #[test]
    fn test_write_byte_strobe_only_after_busy_deasserted() {
        let mut sim = SimIo::new(&[HELD, HELD, HELD, READY, LATCHED, READY]);
        let deadline = Deadline::after(Duration::ZERO);

        write_byte(&mut sim, 0x00, &deadline).unwrap();

        let strobe_at = sim
            .ops
            .iter()
            .position(|op| *op == SimOp::Frob(Control::STROBE, Control::STROBE))
            .unwrap();
        let ready_at = sim
            .ops
            .iter()
            .position(|op| *op == SimOp::Status(READY))
            .unwrap();

        assert!(ready_at < strobe_at, "STROBE asserted before BUSY deasserted");
        // The byte is on the data lines before STROBE announces it.
        assert_eq!(sim.ops[strobe_at - 1], SimOp::WriteData(0x00));
    }

    #[test]
    fn test_write_byte_waits_for_ack_and_busy_release() {
        // After the latch, ACK stays asserted for a while: the transfer
        // must not complete until ACK *and* BUSY are both deasserted.
        let mut sim = SimIo::new(&[READY, LATCHED, HELD, PRESENTING, LATCHED, READY]);
        let deadline = Deadline::after(Duration::ZERO);

        write_byte(&mut sim, 0xFF, &deadline).unwrap();

        // Four polls in AwaitComplete: HELD, PRESENTING, LATCHED, READY.
        let polls_after_release = sim
            .ops
            .iter()
            .skip_while(|op| **op != SimOp::Frob(Control::STROBE, Control::empty()))
            .filter(|op| matches!(op, SimOp::Status(_)))
            .count();
        assert_eq!(polls_after_release, 4);
    }

    #[test]
    fn test_write_byte_times_out_while_printer_busy() {
        let mut sim = SimIo::new(&[HELD]);
        let deadline = Deadline::after(Duration::from_millis(5));

        let err = write_byte(&mut sim, 0x42, &deadline).unwrap_err();
        assert_eq!(err, MartelError::WriteTimeout);
        // The byte was never presented.
        assert!(!sim.ops.iter().any(|op| matches!(op, SimOp::WriteData(_))));
    }

    #[test]
    fn test_write_byte_times_out_waiting_for_latch() {
        // Ready, but the printer never asserts BUSY after STROBE.
        let mut sim = SimIo::new(&[READY]);
        let deadline = Deadline::after(Duration::from_millis(5));

        let err = write_byte(&mut sim, 0x42, &deadline).unwrap_err();
        assert_eq!(err, MartelError::WriteTimeout);
        assert!(sim.ops.contains(&SimOp::WriteData(0x42)));
    }

    #[test]
    fn test_write_polled_idles_lines_on_failure() {
        let mut sim = SimIo::new(&[HELD]);
        let deadline = Deadline::after(Duration::from_millis(5));

        write_polled(&mut sim, &[1, 2, 3], &deadline).unwrap_err();

        let tail: Vec<_> = sim.ops[sim.ops.len() - 3..].to_vec();
        assert_eq!(
            tail,
            vec![
                SimOp::Frob(Control::INIT, Control::INIT),
                SimOp::Frob(Control::STROBE, Control::empty()),
                SimOp::Frob(Control::AUTOFD, Control::empty()),
            ]
        );
    }

    #[test]
    fn test_read_byte_handshake_order() {
        let mut sim = SimIo::new(&[READY, PRESENTING, READY]);
        sim.data_in.push_back(0x5A);
        let deadline = Deadline::after(Duration::ZERO);

        let byte = read_byte(&mut sim, &deadline).unwrap();
        assert_eq!(byte, 0x5A);

        assert_eq!(
            sim.ops,
            vec![
                SimOp::Status(READY),
                SimOp::Frob(Control::AUTOFD, Control::AUTOFD),
                SimOp::Status(PRESENTING),
                SimOp::ReadData,
                SimOp::Frob(Control::AUTOFD, Control::empty()),
                SimOp::Frob(Control::STROBE, Control::STROBE),
                SimOp::Status(READY),
                SimOp::Frob(Control::STROBE, Control::empty()),
            ]
        );
    }

    #[test]
    fn test_read_byte_timeout_is_read_timeout() {
        let mut sim = SimIo::new(&[READY]);
        let deadline = Deadline::after(Duration::from_millis(5));

        // AUTOFD raised but the printer never presents data.
        let err = read_byte(&mut sim, &deadline).unwrap_err();
        assert_eq!(err, MartelError::ReadTimeout);
    }

    #[test]
    fn test_read_restores_output_direction_on_success() {
        let mut sim = SimIo::new(&[READY, PRESENTING, READY, READY, PRESENTING, READY]);
        sim.data_in.extend([0x01, 0x02]);
        let deadline = Deadline::after(Duration::ZERO);

        let mut buf = [0u8; 2];
        read_switched(&mut sim, &mut buf, &deadline).unwrap();
        assert_eq!(buf, [0x01, 0x02]);

        assert_eq!(sim.ops.first(), Some(&SimOp::Direction(true)));
        assert_eq!(sim.ops.last(), Some(&SimOp::Direction(false)));
    }

    #[test]
    fn test_read_restores_output_direction_on_error() {
        // The printer stays busy: the transfer times out, yet the line
        // drivers must be back in output mode afterwards.
        let mut sim = SimIo::new(&[HELD]);
        let deadline = Deadline::after(Duration::from_millis(5));

        let mut buf = [0u8; 4];
        let err = read_switched(&mut sim, &mut buf, &deadline).unwrap_err();
        assert_eq!(err, MartelError::ReadTimeout);

        assert_eq!(sim.ops.first(), Some(&SimOp::Direction(true)));
        assert_eq!(sim.ops.last(), Some(&SimOp::Direction(false)));
        // Control lines were idled before the direction switch back.
        let idle_at = sim
            .ops
            .iter()
            .position(|op| *op == SimOp::Frob(Control::INIT, Control::INIT))
            .unwrap();
        assert!(idle_at < sim.ops.len() - 1);
    }

    #[test]
    fn test_queued_write_paces_on_interrupts() {
        let mut sim = SimIo::new(&[]);
        sim.submit_limit = 4;
        sim.irq_counts = VecDeque::from(vec![4, 4]);
        let deadline = Deadline::after(Duration::ZERO);
        let mut pending = 0;

        write_queued(&mut sim, &mut pending, &[0u8; 10], &deadline).unwrap();

        assert_eq!(
            sim.ops,
            vec![
                // pending == 0: first submit goes straight through
                SimOp::Submit(4),
                SimOp::WaitIrq,
                SimOp::Submit(4),
                SimOp::WaitIrq,
                SimOp::Submit(2),
            ]
        );
        assert_eq!(pending, 2);
    }

    #[test]
    fn test_retire_clamps_when_hardware_over_reports() {
        let mut sim = SimIo::new(&[]);
        sim.irq_counts = VecDeque::from(vec![9]);
        let deadline = Deadline::after(Duration::ZERO);

        let mut pending = 3;
        retire_irqs(&mut sim, &mut pending, &deadline).unwrap();
        assert_eq!(pending, 0);
    }

    #[test]
    fn test_retire_is_noop_with_nothing_pending() {
        let mut sim = SimIo::new(&[]);
        let deadline = Deadline::after(Duration::ZERO);

        let mut pending = 0;
        retire_irqs(&mut sim, &mut pending, &deadline).unwrap();
        assert!(sim.ops.is_empty());
    }

    #[test]
    fn test_status_polarity() {
        assert!(READY.busy_deasserted());
        assert!(READY.ack_deasserted());
        assert!(HELD.busy_asserted());
        assert!(HELD.ack_asserted());
        assert!(LATCHED.busy_asserted());
        assert!(LATCHED.ack_deasserted());
        assert!(PRESENTING.ack_asserted());
        assert!(PRESENTING.busy_deasserted());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("poll".parse::<ParallelMode>().unwrap(), ParallelMode::Poll);
        assert_eq!("irq".parse::<ParallelMode>().unwrap(), ParallelMode::Irq);
        assert_eq!(
            "interrupt".parse::<ParallelMode>(),
            Err(MartelError::InvalidParallelMode)
        );
    }

    #[test]
    fn test_settings_from_uri() {
        let uri = DeviceUri::parse("martel:/dev/parport0?type=parallel+mode=irq").unwrap();
        let settings = ParallelSettings::from_uri(&uri).unwrap();
        assert_eq!(settings.device(), "/dev/parport0");
        assert_eq!(settings.mode(), ParallelMode::Irq);
    }

    #[test]
    fn test_settings_default_mode_is_poll() {
        let settings = ParallelSettings::new("/dev/parport0").unwrap();
        assert_eq!(settings.mode(), ParallelMode::Poll);
    }

    #[test]
    fn test_to_uri_serializes_mode() {
        let mut settings = ParallelSettings::new("/dev/parport0").unwrap();
        settings.set_mode(ParallelMode::Irq);
        assert_eq!(
            settings.to_uri().unwrap(),
            "martel:/dev/parport0?type=parallel+mode=irq"
        );
    }
}
