//! Command-line interface for faultline: arms the crash reporter and faults
//! on demand.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use libfaultline::{FATAL_SIGNALS, Platform, registers};
use log::info;
use nix::sys::signal::{self, Signal};

/// Top-level argument parser.
#[derive(Parser, Debug)]
#[command(name = "faultline", version, about = "Crash reports for fatal signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the fault handler, then trigger a fatal signal.
    Crash {
        #[arg(value_enum)]
        kind: Fault,
        /// Number of times to run initialization before faulting.
        #[arg(long, default_value_t = 1)]
        installs: u32,
    },
    /// Show the detected platform and whether registers can be extracted.
    Platform,
    /// Display version information for diagnostics.
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Fault {
    /// Store to an unmapped address.
    Segv,
    /// Raised bus error.
    Bus,
    /// Integer division by zero (raised where the CPU does not trap).
    Fpe,
    /// Undefined instruction (raised on other architectures).
    Ill,
}

impl Fault {
    fn signal(self) -> Signal {
        match self {
            Fault::Segv => Signal::SIGSEGV,
            Fault::Bus => Signal::SIGBUS,
            Fault::Fpe => Signal::SIGFPE,
            Fault::Ill => Signal::SIGILL,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Crash { kind, installs } => crash(kind, installs),
        Command::Platform => {
            show_platform();
            Ok(())
        }
        Command::Version => {
            println!("faultline {}", libfaultline::version());
            Ok(())
        }
    }
}

fn crash(kind: Fault, installs: u32) -> Result<()> {
    for _ in 0..installs {
        libfaultline::init();
    }
    info!("Triggering {kind:?} ({})", kind.signal());
    match kind {
        Fault::Segv => write_unmapped(),
        Fault::Bus => raise(Signal::SIGBUS),
        Fault::Fpe => divide_by_zero(),
        Fault::Ill => illegal_instruction(),
    }
    bail!("{} was delivered but the process survived", kind.signal())
}

fn show_platform() {
    let platform = Platform::current();
    let support = if registers::lookup(platform).is_some() {
        "supported"
    } else {
        "unavailable"
    };
    println!("platform:  {platform}");
    println!("registers: {support}");
    let signals: Vec<&str> = FATAL_SIGNALS.iter().map(|s| s.as_str()).collect();
    println!("signals:   {}", signals.join(", "));
}

fn raise(signal: Signal) {
    if let Err(err) = signal::raise(signal) {
        log::error!("raise({signal}) failed: {err}");
    }
}

fn write_unmapped() {
    // The first page is never mapped.
    let ptr = std::hint::black_box(0x10usize) as *mut u8;
    unsafe { ptr.write_volatile(1) };
}

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
fn divide_by_zero() {
    unsafe {
        std::arch::asm!(
            "div {divisor:e}",
            divisor = in(reg) 0u32,
            inout("eax") 1u32 => _,
            inout("edx") 0u32 => _,
        )
    };
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
fn divide_by_zero() {
    raise(Signal::SIGFPE);
}

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
fn illegal_instruction() {
    unsafe { std::arch::asm!("ud2") };
}

#[cfg(target_arch = "aarch64")]
fn illegal_instruction() {
    unsafe { std::arch::asm!("udf #0") };
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
fn illegal_instruction() {
    raise(Signal::SIGILL);
}
