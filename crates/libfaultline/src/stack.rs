//! Raw dump of the machine words at the faulting stack pointer.

use std::fmt;

use crate::platform::WORD_HEX_WIDTH;

/// Number of words printed in the `--- STACK VARIABLES ---` block.
pub const STACK_SLOTS: usize = 16;

/// Writes [`STACK_SLOTS`] `(address) -> value` lines for the words starting
/// at `sp`, highest address first.
///
/// # Safety
/// Nothing is bounds-checked against the real stack extent. `sp` must be
/// readable for [`STACK_SLOTS`] words, or the caller must accept that the read
/// itself faults. Inside the fault handler that second fault falls through to
/// the default disposition and terminates the process.
pub unsafe fn write_stack<W: fmt::Write + ?Sized>(w: &mut W, sp: *const usize) -> fmt::Result {
    w.write_str("--- STACK VARIABLES ---\n")?;
    for slot in (0..STACK_SLOTS).rev() {
        let addr = sp.wrapping_add(slot);
        // Interrupted code may leave sp misaligned.
        let value = unsafe { addr.read_unaligned() };
        writeln!(
            w,
            "({:0width$x}) -> {:0width$x}",
            addr as usize,
            value,
            width = WORD_HEX_WIDTH
        )?;
    }
    Ok(())
}
