//! End-to-end checks: run the binary, let it fault, inspect stderr and the
//! way the process died.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Output};

const BEGIN: &str = "=== BUG REPORT [BEGIN] ===";
const END: &str = "=== BUG REPORT [END] ===";

fn crash(kind: &str, installs: u32) -> Output {
    Command::new(env!("CARGO_BIN_EXE_faultline"))
        .args(["crash", kind, "--installs", &installs.to_string()])
        .output()
        .expect("failed to spawn faultline")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Lines of the section that starts after `header`, up to the next blank line.
fn section<'a>(report: &'a str, header: &str) -> Vec<&'a str> {
    report
        .split(&format!("{header}\n"))
        .nth(1)
        .map(|rest| rest.lines().take_while(|l| !l.is_empty()).collect())
        .unwrap_or_default()
}

fn assert_report(kind: &str, signum: i32) {
    let output = crash(kind, 1);
    let report = stderr(&output);

    assert_eq!(report.matches(BEGIN).count(), 1, "{report}");
    assert_eq!(report.matches(END).count(), 1, "{report}");
    assert!(report.contains(&format!("SIGNAL: {signum}\n")), "{report}");
    assert!(!section(&report, "--- STACK TRACE ---").is_empty(), "{report}");
    assert!(report.contains("--- REGISTERS ---\n"), "{report}");

    // Killed by the original signal, not by an explicit exit.
    assert_eq!(output.status.code(), None);
    assert_eq!(output.status.signal(), Some(signum));
}

#[test]
fn segv_is_reported_then_fatal() {
    assert_report("segv", libc::SIGSEGV);
}

#[test]
fn bus_is_reported_then_fatal() {
    assert_report("bus", libc::SIGBUS);
}

#[test]
fn fpe_is_reported_then_fatal() {
    assert_report("fpe", libc::SIGFPE);
}

#[test]
fn ill_is_reported_then_fatal() {
    assert_report("ill", libc::SIGILL);
}

#[test]
fn repeated_init_emits_one_report() {
    let output = crash("segv", 3);
    let report = stderr(&output);
    assert_eq!(report.matches(BEGIN).count(), 1, "{report}");
    assert_eq!(report.matches(END).count(), 1, "{report}");
    assert_eq!(output.status.signal(), Some(libc::SIGSEGV));
}

#[test]
fn without_init_there_is_no_report() {
    let output = crash("segv", 0);
    assert!(!stderr(&output).contains(BEGIN));
    assert_eq!(output.status.signal(), Some(libc::SIGSEGV));
}

#[cfg(any(
    all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")),
    all(target_os = "macos", any(target_arch = "x86_64", target_arch = "aarch64")),
))]
#[test]
fn stack_window_has_sixteen_slots() {
    let report = stderr(&crash("segv", 1));
    let slots = section(&report, "--- STACK VARIABLES ---");
    assert_eq!(slots.len(), 16, "{report}");
    assert!(slots.iter().all(|l| l.starts_with('(') && l.contains(") -> ")));
}

#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))]
#[test]
fn first_frame_is_the_faulting_instruction() {
    let report = stderr(&crash("ill", 1));
    let rip = section(&report, "--- REGISTERS ---")
        .iter()
        .find_map(|l| l.strip_prefix("RIP:"))
        .and_then(|rest| rest.split_whitespace().next())
        .map(|hex| u64::from_str_radix(hex, 16).unwrap())
        .expect("RIP missing from register dump");

    let frames = section(&report, "--- STACK TRACE ---");
    // glibc prints each frame as `object(symbol+offset) [0xaddr]`.
    assert!(
        frames[0].ends_with(&format!("[{rip:#x}]")),
        "first frame {:?} != rip {rip:#x}",
        frames[0]
    );
}
