//! Crash reports for fatal hardware signals.
//!
//! After [`init`], a segmentation violation, bus error, floating-point
//! exception or illegal instruction writes a delimited report to stderr
//! (signal number, backtrace, registers, raw stack window) and then lets the
//! signal terminate the process exactly as it would have without the handler.
//!
//! Everything reachable from the handler is async-signal-safe: no heap
//! allocation, no locks, output through raw `write(2)` calls only.

pub mod context;
pub mod errors;
pub mod handler;
pub mod output;
pub mod platform;
pub mod registers;
pub mod report;
pub mod stack;
pub mod trace;

pub use context::FaultContext;
pub use errors::{FaultError, FaultResult};
pub use handler::FATAL_SIGNALS;
pub use platform::Platform;

/// Installs the fault handler. Call once, early, at process start.
///
/// Registration failures are logged and otherwise ignored: the affected
/// signal simply gets no report.
pub fn init() {
    if let Err(err) = handler::install() {
        log::warn!("crash reports unavailable for some signals: {err}");
    }
}

/// Exposes the crate version for CLI reporting.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
