//! Error taxonomy for handler installation.
//!
//! Nothing here is produced inside the fault handler itself: once a fatal
//! signal arrives, failures are ignored so the signal can still be re-raised.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;

/// Unified result type across the fault-handling core.
pub type FaultResult<T> = Result<T, FaultError>;

/// Error cases
#[derive(Debug, Error)]
pub enum FaultError {
    #[error("failed to register handler for {signal}: {source}")]
    Registration {
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error("system call failed: {0}")]
    SysCall(#[from] Errno),
}
