//! Async-signal-safe output for crash reports.
//!
//! `std::io::Stderr` takes a reentrant lock and `eprintln!` may allocate, so
//! neither can be used once a fault has interrupted arbitrary code. Reports go
//! through [`FdSink`] instead: plain `write(2)` calls on a borrowed descriptor.

use std::fmt;
use std::os::fd::BorrowedFd;

use libc::c_void;
use nix::errno::Errno;
use nix::unistd;

use crate::trace;

/// Destination of a crash report.
pub trait ReportSink: fmt::Write {
    /// Writes one line per backtrace frame.
    fn write_frames(&mut self, frames: &[*mut c_void]) -> fmt::Result;
}

/// Unbuffered writer over a file descriptor.
pub struct FdSink<'fd> {
    fd: BorrowedFd<'fd>,
}

impl<'fd> FdSink<'fd> {
    pub fn new(fd: BorrowedFd<'fd>) -> Self {
        Self { fd }
    }

    fn write_all(&self, mut buf: &[u8]) -> nix::Result<()> {
        while !buf.is_empty() {
            match unistd::write(self.fd, buf) {
                Ok(0) => return Err(Errno::EIO),
                Ok(n) => buf = &buf[n..],
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl FdSink<'static> {
    /// Sink over the process's standard error descriptor.
    pub fn stderr() -> Self {
        // SAFETY: descriptor 2 is never closed by this crate; if the host closed
        // it, writes fail with EBADF and the report is lost, nothing worse.
        Self::new(unsafe { BorrowedFd::borrow_raw(libc::STDERR_FILENO) })
    }
}

impl fmt::Write for FdSink<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl ReportSink for FdSink<'_> {
    #[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos"))]
    fn write_frames(&mut self, frames: &[*mut c_void]) -> fmt::Result {
        trace::write_symbols(self.fd, frames);
        Ok(())
    }

    #[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos")))]
    fn write_frames(&mut self, frames: &[*mut c_void]) -> fmt::Result {
        trace::write_frame_addresses(self, frames)
    }
}

/// In-memory rendering, used to inspect reports without crashing.
impl ReportSink for String {
    fn write_frames(&mut self, frames: &[*mut c_void]) -> fmt::Result {
        trace::write_frame_addresses(self, frames)
    }
}
