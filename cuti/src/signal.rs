//! POSIX signal handling (spec §5 "Cross-thread communication"):
//! [`install_default_signals`] arms SIGINT/SIGTERM handlers that do
//! only async-signal-safe work — setting the dispatcher's stop flag
//! and signalling its [`WakeupHandle`] — then return, leaving the
//! actual shutdown sequence to the dispatcher's own worker threads.
//!
//! The whole module is gated behind the `default-signals` feature:
//! tests exercise shutdown by calling the dispatcher's own `stop`
//! directly, so the library itself does not need to touch process-wide
//! signal disposition unless the embedding binary opts in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::net::WakeupHandle;

struct Registration {
    handle: WakeupHandle,
    stop_flag: Arc<AtomicBool>,
}

static REGISTRATION: OnceLock<Registration> = OnceLock::new();

/// Arms SIGINT/SIGTERM so that, when delivered, `stop_flag` is set and
/// `handle` is signalled. Only the first call in a process takes
/// effect — signal disposition is process-wide, so a second dispatcher
/// calling this would otherwise silently steal the first one's
/// handlers.
pub fn install_default_signals(
    handle: WakeupHandle,
    stop_flag: Arc<AtomicBool>,
) -> std::io::Result<()> {
    if REGISTRATION.set(Registration { handle, stop_flag }).is_err() {
        return Ok(());
    }
    unsafe {
        register(libc::SIGINT)?;
        register(libc::SIGTERM)?;
    }
    Ok(())
}

unsafe fn register(signum: libc::c_int) -> std::io::Result<()> {
    let previous = libc::signal(signum, on_signal as libc::sighandler_t);
    if previous == libc::SIG_ERR {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

extern "C" fn on_signal(_signum: libc::c_int) {
    if let Some(registration) = REGISTRATION.get() {
        registration.stop_flag.store(true, Ordering::SeqCst);
        let _ = registration.handle.signal();
    }
}
