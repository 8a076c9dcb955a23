//! Register extraction from a fault context.
//!
//! Each supported (OS, architecture) pair has one [`Strategy`]: a pure
//! function mapping the OS-defined `ucontext_t` to a [`RegisterSet`] with the
//! register names and row layout used in crash reports. Strategies never
//! allocate or block, so they are callable from a signal handler.
//!
//! Only the entry for the compilation target is present in the table; the
//! `ucontext_t` layouts of other targets do not exist in this build. On macOS
//! the layout is the one introduced with OS X 10.6, which is the oldest
//! release any Rust target supports.

use std::fmt;

use libc::ucontext_t;

use crate::context::FaultContext;
use crate::platform::{Arch, Os, Platform, WORD_HEX_WIDTH};

/// Capacity of a [`RegisterSet`]. aarch64 needs 34 slots.
pub const MAX_REGISTERS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Report label, padded to a fixed width where the layout wants it.
    pub name: &'static str,
    pub value: usize,
}

/// Fixed-capacity, stack-resident register snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RegisterSet {
    regs: [Register; MAX_REGISTERS],
    len: usize,
    columns: usize,
    ip: usize,
    sp: usize,
}

impl RegisterSet {
    /// Empty set printed `columns` registers per row.
    pub const fn new(columns: usize) -> Self {
        Self {
            regs: [Register { name: "", value: 0 }; MAX_REGISTERS],
            len: 0,
            columns: if columns == 0 { 1 } else { columns },
            ip: 0,
            sp: 0,
        }
    }

    /// Appends a register. Registers past [`MAX_REGISTERS`] are dropped.
    pub fn push(&mut self, name: &'static str, value: usize) -> &mut Self {
        if let Some(slot) = self.regs.get_mut(self.len) {
            *slot = Register { name, value };
            self.len += 1;
        }
        self
    }

    pub fn set_ip(&mut self, ip: usize) -> &mut Self {
        self.ip = ip;
        self
    }

    pub fn set_sp(&mut self, sp: usize) -> &mut Self {
        self.sp = sp;
        self
    }

    pub fn registers(&self) -> &[Register] {
        &self.regs[..self.len]
    }

    /// Looks a register up by label, ignoring the label's padding.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.registers()
            .iter()
            .find(|reg| reg.name.trim_end() == name)
            .map(|reg| reg.value)
    }

    /// Faulting instruction pointer.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Faulting instruction pointer, absent when the context holds null.
    pub fn fault_ip(&self) -> Option<usize> {
        Some(self.ip).filter(|&ip| ip != 0)
    }

    /// Stack pointer at the time of the fault.
    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn columns(&self) -> usize {
        self.columns
    }
}

/// Extraction strategy for one platform.
pub struct Strategy {
    pub platform: Platform,
    extract: fn(&ucontext_t) -> Option<RegisterSet>,
}

impl Strategy {
    /// Returns `None` if the context does not carry machine state (macOS can
    /// hand out a null `uc_mcontext`).
    pub fn extract(&self, ctx: &FaultContext<'_>) -> Option<RegisterSet> {
        (self.extract)(ctx.ucontext())
    }
}

static STRATEGIES: &[Strategy] = &[
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    Strategy {
        platform: Platform::new(Os::Linux, Arch::X86_64),
        extract: linux_x86_64,
    },
    #[cfg(all(target_os = "linux", target_arch = "x86"))]
    Strategy {
        platform: Platform::new(Os::Linux, Arch::X86),
        extract: linux_x86,
    },
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    Strategy {
        platform: Platform::new(Os::Linux, Arch::Aarch64),
        extract: linux_aarch64,
    },
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    Strategy {
        platform: Platform::new(Os::MacOs, Arch::X86_64),
        extract: macos_x86_64,
    },
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    Strategy {
        platform: Platform::new(Os::MacOs, Arch::Aarch64),
        extract: macos_aarch64,
    },
];

pub fn lookup(platform: Platform) -> Option<&'static Strategy> {
    STRATEGIES.iter().find(|s| s.platform == platform)
}

/// Strategy for the running platform, if there is one.
pub fn strategy() -> Option<&'static Strategy> {
    lookup(Platform::current())
}

pub fn extract(ctx: &FaultContext<'_>) -> Option<RegisterSet> {
    strategy()?.extract(ctx)
}

/// Writes the fixed-field register dump followed by a blank line, or
/// `<unavailable>` when there is nothing to print.
pub fn write_registers<W: fmt::Write + ?Sized>(
    w: &mut W,
    set: Option<&RegisterSet>,
) -> fmt::Result {
    let Some(set) = set else {
        return w.write_str("<unavailable>\n");
    };
    for row in set.registers().chunks(set.columns()) {
        for (i, reg) in row.iter().enumerate() {
            if i > 0 {
                w.write_char(' ')?;
            }
            write!(w, "{}:{:0width$x}", reg.name, reg.value, width = WORD_HEX_WIDTH)?;
        }
        w.write_char('\n')?;
    }
    w.write_char('\n')
}

#[cfg(target_arch = "aarch64")]
const AARCH64_GPRS: [&str; 29] = [
    "X0 ", "X1 ", "X2 ", "X3 ", "X4 ", "X5 ", "X6 ", "X7 ", "X8 ", "X9 ", "X10", "X11", "X12",
    "X13", "X14", "X15", "X16", "X17", "X18", "X19", "X20", "X21", "X22", "X23", "X24", "X25",
    "X26", "X27", "X28",
];

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn linux_x86_64(uc: &ucontext_t) -> Option<RegisterSet> {
    use libc::{
        REG_CSGSFS, REG_EFL, REG_R8, REG_R9, REG_R10, REG_R11, REG_R12, REG_R13, REG_R14, REG_R15,
        REG_RAX, REG_RBP, REG_RBX, REG_RCX, REG_RDI, REG_RDX, REG_RIP, REG_RSI, REG_RSP,
    };

    const LAYOUT: [(&str, libc::c_int); 19] = [
        ("RAX", REG_RAX),
        ("RBX", REG_RBX),
        ("RCX", REG_RCX),
        ("RDX", REG_RDX),
        ("RDI", REG_RDI),
        ("RSI", REG_RSI),
        ("RBP", REG_RBP),
        ("RSP", REG_RSP),
        ("R8 ", REG_R8),
        ("R9 ", REG_R9),
        ("R10", REG_R10),
        ("R11", REG_R11),
        ("R12", REG_R12),
        ("R13", REG_R13),
        ("R14", REG_R14),
        ("R15", REG_R15),
        ("RIP", REG_RIP),
        ("EFL", REG_EFL),
        ("CSGSFS", REG_CSGSFS),
    ];

    let gregs = &uc.uc_mcontext.gregs;
    let mut set = RegisterSet::new(2);
    for (name, index) in LAYOUT {
        set.push(name, gregs[index as usize] as usize);
    }
    set.set_ip(gregs[REG_RIP as usize] as usize)
        .set_sp(gregs[REG_RSP as usize] as usize);
    Some(set)
}

#[cfg(all(target_os = "linux", target_arch = "x86"))]
fn linux_x86(uc: &ucontext_t) -> Option<RegisterSet> {
    // Indices into `gregs` as laid out by <sys/ucontext.h> for i386.
    const LAYOUT: [(&str, usize); 16] = [
        ("EAX", 11),
        ("EBX", 8),
        ("ECX", 10),
        ("EDX", 9),
        ("EDI", 4),
        ("ESI", 5),
        ("EBP", 6),
        ("ESP", 7),
        ("SS ", 18),
        ("EFL", 16),
        ("EIP", 14),
        ("CS", 15),
        ("DS ", 3),
        ("ES ", 2),
        ("FS ", 1),
        ("GS", 0),
    ];
    const EIP: usize = 14;
    const ESP: usize = 7;

    let gregs = &uc.uc_mcontext.gregs;
    let word = |index: usize| gregs[index] as u32 as usize;
    let mut set = RegisterSet::new(4);
    for (name, index) in LAYOUT {
        set.push(name, word(index));
    }
    set.set_ip(word(EIP)).set_sp(word(ESP));
    Some(set)
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
fn linux_aarch64(uc: &ucontext_t) -> Option<RegisterSet> {
    let mc = &uc.uc_mcontext;
    let mut set = RegisterSet::new(4);
    for (&name, &value) in AARCH64_GPRS.iter().zip(mc.regs.iter()) {
        set.push(name, value as usize);
    }
    set.push("FP ", mc.regs[29] as usize)
        .push("LR ", mc.regs[30] as usize)
        .push("SP ", mc.sp as usize)
        .push("PC ", mc.pc as usize)
        .push("PST", mc.pstate as usize)
        .set_ip(mc.pc as usize)
        .set_sp(mc.sp as usize);
    Some(set)
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
fn macos_x86_64(uc: &ucontext_t) -> Option<RegisterSet> {
    // SAFETY: the kernel points `uc_mcontext` at machine state that lives as
    // long as the ucontext; fixtures leave it null.
    let ss = &unsafe { uc.uc_mcontext.as_ref() }?.__ss;
    let mut set = RegisterSet::new(2);
    set.push("RAX", ss.__rax as usize)
        .push("RBX", ss.__rbx as usize)
        .push("RCX", ss.__rcx as usize)
        .push("RDX", ss.__rdx as usize)
        .push("RDI", ss.__rdi as usize)
        .push("RSI", ss.__rsi as usize)
        .push("RBP", ss.__rbp as usize)
        .push("RSP", ss.__rsp as usize)
        .push("R8 ", ss.__r8 as usize)
        .push("R9 ", ss.__r9 as usize)
        .push("R10", ss.__r10 as usize)
        .push("R11", ss.__r11 as usize)
        .push("R12", ss.__r12 as usize)
        .push("R13", ss.__r13 as usize)
        .push("R14", ss.__r14 as usize)
        .push("R15", ss.__r15 as usize)
        .push("RIP", ss.__rip as usize)
        .push("EFL", ss.__rflags as usize)
        .push("CS ", ss.__cs as usize)
        .push("FS ", ss.__fs as usize)
        .push("GS ", ss.__gs as usize)
        .set_ip(ss.__rip as usize)
        .set_sp(ss.__rsp as usize);
    Some(set)
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
fn macos_aarch64(uc: &ucontext_t) -> Option<RegisterSet> {
    // SAFETY: see `macos_x86_64`.
    let ss = &unsafe { uc.uc_mcontext.as_ref() }?.__ss;
    let mut set = RegisterSet::new(4);
    for (&name, &value) in AARCH64_GPRS.iter().zip(ss.__x.iter()) {
        set.push(name, value as usize);
    }
    set.push("FP ", ss.__fp as usize)
        .push("LR ", ss.__lr as usize)
        .push("SP ", ss.__sp as usize)
        .push("PC ", ss.__pc as usize)
        .push("CPS", ss.__cpsr as usize)
        .set_ip(ss.__pc as usize)
        .set_sp(ss.__sp as usize);
    Some(set)
}
