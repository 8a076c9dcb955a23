//! Borrowed view of the CPU state the kernel hands to a `SA_SIGINFO` handler.

use libc::{c_void, ucontext_t};

/// Read-only fault context. Only valid for the duration of the handler call
/// that received it, which the lifetime expresses.
#[derive(Clone, Copy)]
pub struct FaultContext<'a> {
    uc: &'a ucontext_t,
}

impl<'a> FaultContext<'a> {
    pub fn new(uc: &'a ucontext_t) -> Self {
        Self { uc }
    }

    /// Wraps the third argument of a `SA_SIGINFO` handler.
    ///
    /// # Safety
    /// `ptr` must be null or point to a `ucontext_t` that outlives `'a`.
    pub unsafe fn from_raw(ptr: *const c_void) -> Option<Self> {
        unsafe { ptr.cast::<ucontext_t>().as_ref() }.map(Self::new)
    }

    pub fn ucontext(&self) -> &'a ucontext_t {
        self.uc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn null_context_is_absent() {
        assert!(unsafe { FaultContext::from_raw(ptr::null()) }.is_none());
    }

    #[test]
    fn raw_context_borrows_the_same_struct() {
        let uc: ucontext_t = unsafe { std::mem::zeroed() };
        let ctx = unsafe { FaultContext::from_raw(ptr::from_ref(&uc).cast()) }.unwrap();
        assert!(ptr::eq(ctx.ucontext(), &uc));
    }
}
