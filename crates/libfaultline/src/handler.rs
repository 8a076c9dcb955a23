//! Installation of the fault handler and the handler itself.
//!
//! Lifecycle: [`install`] once at startup, the handler fires at most once per
//! signal (the disposition is single-shot), and [`reraise`] hands the signal
//! back to the OS so the default fatal action runs. [`reset`] undoes
//! [`install`].

use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_int, c_void, siginfo_t};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::getpid;

use crate::context::FaultContext;
use crate::errors::{FaultError, FaultResult};
use crate::output::FdSink;
use crate::report;
use crate::trace;

/// Signals that get a crash report.
pub const FATAL_SIGNALS: [Signal; 4] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
];

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Registers the fault handler for every signal in [`FATAL_SIGNALS`].
///
/// The disposition is `SA_RESETHAND`, so a second fault (including one
/// inside the handler) goes straight to the default action, and
/// `SA_NODEFER`, so such a fault is not held pending while the report is
/// written. The handler runs on the faulting thread's own stack: the
/// alternate stacks Rust gives each thread are too small for the unwinder.
///
/// Calling this again replaces the handler with an identical one. Every
/// signal is attempted; the first failure is returned.
pub fn install() -> FaultResult<()> {
    trace::prime();

    let action = fault_action();
    // SAFETY: `handle_fault` only uses async-signal-safe operations.
    let (registered, first_error) =
        register_all(|sig| unsafe { signal::sigaction(sig, &action) }.map(drop));
    INSTALLED.store(registered > 0, Ordering::SeqCst);

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn fault_action() -> SigAction {
    SigAction::new(
        SigHandler::SigAction(handle_fault),
        SaFlags::SA_SIGINFO | SaFlags::SA_RESETHAND | SaFlags::SA_NODEFER,
        SigSet::empty(),
    )
}

/// Runs `register` for every fatal signal, returning how many succeeded and
/// the first failure.
fn register_all(
    mut register: impl FnMut(Signal) -> nix::Result<()>,
) -> (usize, Option<FaultError>) {
    let mut registered = 0;
    let mut first_error = None;
    for signal in FATAL_SIGNALS {
        match register(signal) {
            Ok(()) => {
                log::debug!("fault handler installed for {signal}");
                registered += 1;
            }
            Err(source) => {
                log::warn!("could not install fault handler for {signal}: {source}");
                if first_error.is_none() {
                    first_error = Some(FaultError::Registration { signal, source });
                }
            }
        }
    }
    (registered, first_error)
}

/// Restores the default disposition for every signal in [`FATAL_SIGNALS`].
pub fn reset() -> FaultResult<()> {
    for signal in FATAL_SIGNALS {
        unsafe { signal::sigaction(signal, &default_action(SaFlags::empty())) }?;
    }
    INSTALLED.store(false, Ordering::SeqCst);
    log::info!("fault handler removed");
    Ok(())
}

/// Whether [`install`] registered at least one signal (and [`reset`] has not
/// run since).
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Resets `signum` to its default disposition and sends it to this process,
/// so termination status and core dumps are exactly what the OS would have
/// produced without the handler.
///
/// For a synchronous fault the signal is delivered before `kill` returns. If
/// it ever does return, the handler returns too and the faulting instruction
/// re-executes under the default disposition.
pub fn reraise(signum: c_int) {
    let Ok(signal) = Signal::try_from(signum) else {
        return;
    };
    let action =
        default_action(SaFlags::SA_NODEFER | SaFlags::SA_ONSTACK | SaFlags::SA_RESETHAND);
    let _ = unsafe { signal::sigaction(signal, &action) };
    let _ = signal::kill(getpid(), signal);
}

fn default_action(flags: SaFlags) -> SigAction {
    SigAction::new(SigHandler::SigDfl, flags, SigSet::empty())
}

/// Registered for every fatal signal. Writes the report to stderr and
/// re-raises; no allocation, locking or logging happens here.
extern "C" fn handle_fault(signum: c_int, _info: *mut siginfo_t, ucontext: *mut c_void) {
    // SAFETY: the kernel passes a valid ucontext (or null) that lives for the
    // duration of this call.
    let ctx = unsafe { FaultContext::from_raw(ucontext) };
    let mut sink = FdSink::stderr();
    // SAFETY: the process is already going down; a fault while reading the
    // stack window ends it under the default disposition.
    let _ = unsafe { report::emit_report(&mut sink, signum, ctx.as_ref()) };
    reraise(signum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    fn current_action(signal: Signal) -> SigAction {
        // Swap in the default to read the current action, then put it back.
        let dfl = default_action(SaFlags::empty());
        let old = unsafe { signal::sigaction(signal, &dfl) }.unwrap();
        unsafe { signal::sigaction(signal, &old) }.unwrap();
        old
    }

    // A single test owns the process-wide dispositions so parallel tests do
    // not observe each other's changes.
    #[test]
    fn install_twice_then_reset() {
        install().unwrap();
        install().unwrap();
        assert!(is_installed());
        for signal in FATAL_SIGNALS {
            let action = current_action(signal);
            assert!(matches!(action.handler(), SigHandler::SigAction(_)));
            // Single-shot and not deferred: a second fault takes the default action.
            assert!(action.flags().contains(
                SaFlags::SA_SIGINFO | SaFlags::SA_RESETHAND | SaFlags::SA_NODEFER
            ));
        }

        reset().unwrap();
        assert!(!is_installed());
        for signal in FATAL_SIGNALS {
            assert_eq!(current_action(signal).handler(), SigHandler::SigDfl);
        }
    }

    #[test]
    fn fault_action_is_single_shot_and_not_deferred() {
        let flags = fault_action().flags();
        assert!(flags.contains(SaFlags::SA_RESETHAND));
        assert!(flags.contains(SaFlags::SA_NODEFER));
        assert!(flags.contains(SaFlags::SA_SIGINFO));
    }

    #[test]
    fn nothing_registered_when_every_signal_fails() {
        let (registered, err) = register_all(|_| Err(Errno::EINVAL));
        assert_eq!(registered, 0);
        assert!(matches!(
            err,
            Some(FaultError::Registration { signal: Signal::SIGSEGV, source: Errno::EINVAL })
        ));
    }

    #[test]
    fn partial_registration_counts_successes() {
        let (registered, err) = register_all(|signal| match signal {
            Signal::SIGBUS => Err(Errno::EPERM),
            _ => Ok(()),
        });
        assert_eq!(registered, FATAL_SIGNALS.len() - 1);
        assert!(matches!(
            err,
            Some(FaultError::Registration { signal: Signal::SIGBUS, .. })
        ));
    }

    #[test]
    fn reraise_ignores_invalid_signal_numbers() {
        reraise(-1);
        reraise(0);
    }
}
