//! Cancellation signal handler: SIGINT/SIGTERM set a single
//! async-signal-safe flag. Nothing else runs in the handler; the reaper is
//! the sole propagator and propagates at most once per run (spec.md §8
//! property 5).

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_cancel(_signum: libc::c_int) {
    CANCEL_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs the SIGINT/SIGTERM handler. Must be called once, before any
/// helper is launched.
///
/// # Safety
/// Registers a signal handler via `sigaction`; the handler itself touches
/// only an atomic flag, which is async-signal-safe.
pub fn install() {
    let action = SigAction::new(
        SigHandler::Handler(handle_cancel),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: `handle_cancel` only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        signal::sigaction(Signal::SIGINT, &action).expect("failed to install SIGINT handler");
        signal::sigaction(Signal::SIGTERM, &action).expect("failed to install SIGTERM handler");
    }
}

/// `true` once a cancellation signal has been observed.
pub fn cancel_requested() -> bool {
    CANCEL_REQUESTED.load(Ordering::SeqCst)
}

/// Clears the latched flag. Exposed unconditionally (not `cfg(test)`) so
/// integration-test harnesses in other crates of the workspace can reset
/// this process-global state between cases; `cfg(test)` only applies within
/// this crate's own test target and wouldn't be visible to them.
pub fn reset_for_test() {
    CANCEL_REQUESTED.store(false, Ordering::SeqCst);
}
