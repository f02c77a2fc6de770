//! Process hardening.
//!
//! PINs sit in process memory for the whole run, so a crash must not leave
//! them on disk in a core file.

use std::sync::atomic::{AtomicBool, Ordering};

static CORE_DUMPS_DISABLED: AtomicBool = AtomicBool::new(false);

/// Set `RLIMIT_CORE` to zero. Idempotent; returns whether core dumps are off.
pub fn disable_core_dumps() -> bool {
    if CORE_DUMPS_DISABLED.swap(true, Ordering::SeqCst) {
        return true;
    }

    #[cfg(unix)]
    {
        // SAFETY: setrlimit with RLIMIT_CORE=0 only lowers this process's own limit
        let result = unsafe {
            let rlim = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            libc::setrlimit(libc::RLIMIT_CORE, &rlim)
        };
        if result != 0 {
            eprintln!(
                "[strongbox] Warning: failed to disable core dumps: {}",
                std::io::Error::last_os_error()
            );
            CORE_DUMPS_DISABLED.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    #[cfg(not(unix))]
    {
        eprintln!("[strongbox] Warning: core dump prevention not supported on this platform");
        CORE_DUMPS_DISABLED.store(false, Ordering::SeqCst);
        false
    }
}
