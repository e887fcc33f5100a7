//! Ctrl-C / SIGTERM → cancellation flag.
//!
//! The engine polls the flag while waiting for the CSV to appear. The
//! handler restores the default disposition, so a second signal terminates
//! the process.

use std::sync::atomic::AtomicBool;

static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Shared flag raised on the first SIGINT/SIGTERM.
pub fn cancel_flag() -> &'static AtomicBool {
    &CANCELLED
}

#[cfg(unix)]
extern "C" fn on_signal(signum: libc::c_int) {
    CANCELLED.store(true, std::sync::atomic::Ordering::SeqCst);
    // Only async-signal-safe calls here
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
    }
}

/// Install the handlers. Safe to call more than once.
#[cfg(unix)]
pub fn install() {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

/// Non-unix builds rely on default process termination.
#[cfg(not(unix))]
pub fn install() {}
