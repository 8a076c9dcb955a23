//! Layout of the crash report.

use std::fmt;

use crate::context::FaultContext;
use crate::output::ReportSink;
use crate::registers::{self, RegisterSet};
use crate::stack;
use crate::trace::Frames;

pub const BEGIN_MARKER: &str = "=== BUG REPORT [BEGIN] ===";
pub const END_MARKER: &str = "=== BUG REPORT [END] ===";
pub const STACK_TRACE_HEADER: &str = "--- STACK TRACE ---";
pub const REGISTERS_HEADER: &str = "--- REGISTERS ---";

/// Writes a complete report for signal `signum` into `sink`.
///
/// Section order: header and signal number, backtrace (starting at the
/// faulting instruction when it is known), register dump, stack window,
/// footer. Allocation-free as long as `sink` is.
///
/// # Safety
/// The stack window is read without bounds checks from the stack pointer in
/// `ctx`; see [`stack::write_stack`].
pub unsafe fn emit_report<S: ReportSink + ?Sized>(
    sink: &mut S,
    signum: libc::c_int,
    ctx: Option<&FaultContext<'_>>,
) -> fmt::Result {
    let regs = ctx.and_then(registers::extract);

    sink.write_str("\n\n")?;
    writeln!(sink, "{BEGIN_MARKER}")?;
    writeln!(sink, "SIGNAL: {signum}")?;
    writeln!(sink)?;

    writeln!(sink, "{STACK_TRACE_HEADER}")?;
    let frames = Frames::capture(regs.as_ref().and_then(RegisterSet::fault_ip));
    sink.write_frames(frames.as_slice())?;
    writeln!(sink)?;

    writeln!(sink, "{REGISTERS_HEADER}")?;
    registers::write_registers(sink, regs.as_ref())?;
    if let Some(set) = &regs {
        unsafe { stack::write_stack(sink, set.sp() as *const usize) }?;
    }
    writeln!(sink)?;

    writeln!(sink, "{END_MARKER}")?;
    writeln!(sink)
}
