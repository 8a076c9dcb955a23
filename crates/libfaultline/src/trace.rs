//! Call-stack capture from inside a fault handler.
//!
//! On glibc and macOS the libc `backtrace(3)` family does the walking and
//! symbol lookup; both work from a signal handler once primed. Elsewhere the
//! `backtrace` crate walks the stack and frames are printed as bare
//! addresses.

use std::fmt;
use std::ptr;

use libc::c_void;

/// Capacity of a captured trace.
pub const MAX_FRAMES: usize = 100;

/// Fixed-capacity, stack-resident list of return addresses.
pub struct Frames {
    ips: [*mut c_void; MAX_FRAMES],
    len: usize,
}

impl Frames {
    /// Captures the current call stack.
    ///
    /// The first captured frame always belongs to this function. Stack
    /// walking from a handler frame does not reliably reach the faulting
    /// instruction, so when `fault_ip` is known and non-null it replaces that
    /// first frame.
    #[inline(never)]
    pub fn capture(fault_ip: Option<usize>) -> Self {
        let mut frames = Self {
            ips: [ptr::null_mut(); MAX_FRAMES],
            len: 0,
        };
        frames.len = walk(&mut frames.ips);
        if let Some(ip) = fault_ip.filter(|&ip| ip != 0) {
            frames.ips[0] = ip as *mut c_void;
            frames.len = frames.len.max(1);
        }
        frames
    }

    pub fn as_slice(&self) -> &[*mut c_void] {
        &self.ips[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Runs one throw-away capture so the unwinder's lazy setup (glibc loads
/// libgcc_s on first use) happens outside signal context.
pub fn prime() {
    let frames = Frames::capture(None);
    log::trace!("primed stack walker, {} frames", frames.len());
}

/// Writes one `[0x...]` line per frame.
pub fn write_frame_addresses<W: fmt::Write + ?Sized>(
    w: &mut W,
    frames: &[*mut c_void],
) -> fmt::Result {
    for ip in frames {
        writeln!(w, "[{:#x}]", *ip as usize)?;
    }
    Ok(())
}

#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos"))]
pub(crate) use execinfo::write_symbols;

#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos"))]
use execinfo::walk;

#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos")))]
use unwinder::walk;

#[cfg(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos"))]
mod execinfo {
    use std::os::fd::{AsRawFd, BorrowedFd};

    use libc::{c_int, c_void};

    unsafe extern "C" {
        fn backtrace(buffer: *mut *mut c_void, size: c_int) -> c_int;
        fn backtrace_symbols_fd(buffer: *const *mut c_void, size: c_int, fd: c_int);
    }

    pub(super) fn walk(buf: &mut [*mut c_void]) -> usize {
        let n = unsafe { backtrace(buf.as_mut_ptr(), buf.len() as c_int) };
        n.max(0) as usize
    }

    /// Symbolizes `frames` straight onto `fd`, one line per frame, without
    /// allocating.
    pub(crate) fn write_symbols(fd: BorrowedFd<'_>, frames: &[*mut c_void]) {
        unsafe { backtrace_symbols_fd(frames.as_ptr(), frames.len() as c_int, fd.as_raw_fd()) }
    }
}

#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_os = "macos")))]
mod unwinder {
    use libc::c_void;

    pub(super) fn walk(buf: &mut [*mut c_void]) -> usize {
        let mut len = 0;
        // SAFETY: only the instruction pointers are read; nothing is resolved.
        unsafe {
            backtrace::trace_unsynchronized(|frame| {
                buf[len] = frame.ip();
                len += 1;
                len < buf.len()
            })
        };
        len
    }
}
