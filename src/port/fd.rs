//! # Device File Descriptors
//!
//! Low-level glue shared by the serial, USB and parallel backends: an RAII
//! file descriptor for an exclusively-opened device node, `select(2)`-based
//! readiness waits, and the timeout-bounded transfer loops used by the
//! tty-style backends.
//!
//! All blocking follows the same convention as the public timeout setters:
//! a `Duration::ZERO` timeout means "wait forever".

use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::ptr;
use std::thread;
use std::time::Duration;

use crate::error::{MartelError, Result};
use crate::port::timeout::Deadline;

/// Poll interval while waiting for the kernel output queue to drain.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// An open device node, closed on drop.
#[derive(Debug)]
pub(crate) struct DeviceFd {
    fd: RawFd,
}

impl DeviceFd {
    /// Open a device node with the given `open(2)` flags.
    ///
    /// Callers pass `O_EXCL` so no other process or port instance can hold
    /// the device concurrently; the kernel rejects the open otherwise.
    pub fn open(path: &str, flags: libc::c_int) -> io::Result<Self> {
        let cpath = CString::new(path)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        let fd = unsafe { libc::open(cpath.as_ptr(), flags) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { fd })
    }

    /// Wrap an already-open descriptor.
    #[cfg(test)]
    pub(crate) fn from_raw(fd: RawFd) -> Self {
        Self { fd }
    }

    /// The raw descriptor, for ioctl/select/termios calls.
    pub fn raw(&self) -> RawFd {
        self.fd
    }

    /// Close the descriptor, reporting the kernel's verdict.
    ///
    /// After this call the value is inert; a later drop does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        if self.fd < 0 {
            return Ok(());
        }
        let fd = std::mem::replace(&mut self.fd, -1);
        if unsafe { libc::close(fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for DeviceFd {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

/// Which direction to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Readable,
    Writable,
}

/// Wait until the descriptor is ready for the given direction.
///
/// Returns `Ok(true)` when ready, `Ok(false)` on timeout. A zero timeout
/// blocks indefinitely.
pub(crate) fn wait_ready(
    fd: RawFd,
    readiness: Readiness,
    timeout: Duration,
) -> io::Result<bool> {
    let mut fds = unsafe {
        let mut fds = MaybeUninit::<libc::fd_set>::zeroed().assume_init();
        libc::FD_ZERO(&mut fds);
        libc::FD_SET(fd, &mut fds);
        fds
    };

    let fds_ptr: *mut libc::fd_set = &mut fds;
    let (read_fds, write_fds) = match readiness {
        Readiness::Readable => (fds_ptr, ptr::null_mut()),
        Readiness::Writable => (ptr::null_mut(), fds_ptr),
    };

    let n = if timeout.is_zero() {
        unsafe { libc::select(fd + 1, read_fds, write_fds, ptr::null_mut(), ptr::null_mut()) }
    } else {
        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };
        unsafe { libc::select(fd + 1, read_fds, write_fds, ptr::null_mut(), &mut tv) }
    };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n > 0)
}

/// Write the whole buffer, waiting for output readiness before each
/// transfer with the configured timeout.
///
/// Each wait uses the full timeout, so the bound applies per readiness
/// wait, not to the operation as a whole.
pub(crate) fn write_all(fd: RawFd, buf: &[u8], timeout: Duration) -> Result<()> {
    let mut buf = buf;

    while !buf.is_empty() {
        match wait_ready(fd, Readiness::Writable, timeout) {
            Err(_) => return Err(MartelError::WriteFailed),
            Ok(false) => return Err(MartelError::WriteTimeout),
            Ok(true) => {}
        }

        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(MartelError::WriteFailed);
        }
        buf = &buf[n as usize..];
    }

    Ok(())
}

/// Fill the whole buffer, waiting for input readiness before each transfer
/// with the configured timeout.
pub(crate) fn read_all(fd: RawFd, buf: &mut [u8], timeout: Duration) -> Result<()> {
    let mut buf = buf;

    while !buf.is_empty() {
        match wait_ready(fd, Readiness::Readable, timeout) {
            Err(_) => return Err(MartelError::ReadFailed),
            Ok(false) => return Err(MartelError::ReadTimeout),
            Ok(true) => {}
        }

        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(MartelError::ReadFailed);
        }
        let rest = buf;
        buf = &mut rest[n as usize..];
    }

    Ok(())
}

/// Block until the kernel output queue is empty.
///
/// With a zero timeout this is a plain `tcdrain(3)`. With a nonzero
/// timeout the queue length (`TIOCOUTQ`) is polled against a deadline so
/// expiry surfaces as [`MartelError::WriteTimeout`] rather than a generic
/// failure, and the final `tcdrain` only runs once the queue is empty.
pub(crate) fn drain_output(fd: RawFd, timeout: Duration) -> Result<()> {
    if !timeout.is_zero() {
        let deadline = Deadline::after(timeout);

        loop {
            let mut queued: libc::c_int = 0;
            if unsafe { libc::ioctl(fd, libc::TIOCOUTQ as libc::c_ulong, &mut queued) } < 0 {
                return Err(MartelError::SyncFailed);
            }
            if queued == 0 {
                break;
            }
            if deadline.expired() {
                return Err(MartelError::WriteTimeout);
            }
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }

    if unsafe { libc::tcdrain(fd) } < 0 {
        return Err(MartelError::SyncFailed);
    }
    Ok(())
}

/// Discard both the input and output kernel queues immediately.
pub(crate) fn discard_queues(fd: RawFd) -> Result<()> {
    if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } < 0 {
        return Err(MartelError::FlushFailed);
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
